//! Source preparation for the script host.
//!
//! `.ts` stack files are reduced to plain JavaScript before evaluation by
//! stripping the common type-syntax subset: parameter and variable
//! annotations, return types, `interface` and `type` declarations, `as`
//! casts and function generics. Strings, template literals and comments pass
//! through untouched. Runtime-affecting TypeScript (enums, namespaces,
//! decorators) is not supported and surfaces as a script error on evaluation.

use std::path::Path;

use crate::error::AppError;

/// Prepare one source file for evaluation.
pub fn prepare(path: &Path, source: String) -> Result<String, AppError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if ext == "ts" {
        return Ok(strip_types(&source));
    }
    Ok(source)
}

pub fn strip_types(source: &str) -> String {
    Stripper::new(source).run()
}

const CONTROL_KEYWORDS: [&str; 7] = ["if", "for", "while", "switch", "catch", "return", "do"];

#[derive(Clone, Copy)]
struct ParenFrame {
    params: bool,
    brace_depth: i32,
}

#[derive(Clone, Copy, PartialEq)]
enum VarState {
    None,
    Keyword,
    Declarator,
}

struct Stripper {
    chars: Vec<char>,
    out: String,
    i: usize,
    brace_depth: i32,
    parens: Vec<ParenFrame>,
    var_state: VarState,
    in_import: bool,
    prev_word: Option<String>,
    prev_prev_word: Option<String>,
    last_sig: Option<char>,
}

impl Stripper {
    fn new(source: &str) -> Self {
        Stripper {
            chars: source.chars().collect(),
            out: String::with_capacity(source.len()),
            i: 0,
            brace_depth: 0,
            parens: Vec::new(),
            var_state: VarState::None,
            in_import: false,
            prev_word: None,
            prev_prev_word: None,
            last_sig: None,
        }
    }

    fn run(mut self) -> String {
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            match c {
                '/' if self.peek(1) == Some('/') => self.copy_line_comment(),
                '/' if self.peek(1) == Some('*') => self.copy_block_comment(),
                '"' | '\'' => self.copy_string(c),
                '`' => self.copy_template(),
                '(' => self.open_paren(),
                ')' => self.close_paren(),
                '{' | '[' => {
                    if c == '{' {
                        self.brace_depth += 1;
                    }
                    if self.var_state == VarState::Keyword {
                        // destructuring declaration, no annotation expected
                        self.var_state = VarState::None;
                    }
                    self.emit_char();
                }
                '}' => {
                    self.brace_depth -= 1;
                    self.emit_char();
                }
                ':' => self.colon(),
                '=' => {
                    if self.var_state == VarState::Declarator {
                        self.var_state = VarState::None;
                    }
                    self.emit_char();
                }
                ',' => {
                    if self.var_state == VarState::Declarator {
                        self.var_state = VarState::Keyword;
                    }
                    self.emit_char();
                }
                ';' | '\n' => {
                    self.var_state = VarState::None;
                    self.in_import = false;
                    self.emit_char();
                }
                c if is_ident_start(c) => self.word(),
                _ => self.emit_char(),
            }
        }
        self.out
    }

    // --- token handling ---

    fn word(&mut self) {
        let start = self.i;
        while self.i < self.chars.len() && is_ident_char(self.chars[self.i]) {
            self.i += 1;
        }
        let word: String = self.chars[start..self.i].iter().collect();
        let after_dot = self.last_sig == Some('.');

        if !after_dot {
            match word.as_str() {
                "interface" => {
                    if self.skip_interface() {
                        return;
                    }
                }
                "type" => {
                    if let Some(end) = self.scan_type_alias(self.i) {
                        self.i = end;
                        return;
                    }
                }
                "declare" => {
                    self.skip_to_line_end();
                    return;
                }
                "export" => {
                    let j = self.skip_ws(self.i);
                    match self.word_at(j).as_deref() {
                        // `export interface` / `export declare`: drop the
                        // keyword, the next iteration strips the declaration
                        Some("interface") | Some("declare") => return,
                        // `export type …` is type-only however it continues
                        Some("type") => {
                            self.skip_to_statement_end();
                            return;
                        }
                        _ => {}
                    }
                }
                "import" => {
                    let j = self.skip_ws(self.i);
                    if self.word_at(j).as_deref() == Some("type") {
                        self.skip_to_statement_end();
                        return;
                    }
                    self.in_import = true;
                }
                "as" | "satisfies" => {
                    if !self.in_import && self.prev_is_value() {
                        if let Some(end) = self.scan_type(self.skip_ws(self.i), true) {
                            self.i = end;
                            return;
                        }
                    }
                }
                "const" | "let" | "var" => {
                    self.var_state = VarState::Keyword;
                }
                _ => {
                    if self.var_state == VarState::Keyword {
                        self.var_state = VarState::Declarator;
                    }
                }
            }
        }

        let function_name = self.prev_word.as_deref() == Some("function");
        self.out.push_str(&word);
        self.last_sig = word.chars().last();
        self.prev_prev_word = self.prev_word.take();
        self.prev_word = Some(word);

        // generic parameters on a function declaration: function f<T>(…)
        if function_name {
            let j = self.skip_ws(self.i);
            if j < self.chars.len() && self.chars[j] == '<' {
                if let Some(end) = self.matching_angle(j) {
                    self.i = end + 1;
                }
            }
        }
    }

    fn open_paren(&mut self) {
        let params = self.is_params_paren();
        self.parens.push(ParenFrame { params, brace_depth: self.brace_depth });
        self.emit_char();
    }

    fn close_paren(&mut self) {
        let frame = self.parens.pop();
        self.emit_char();

        if let Some(frame) = frame {
            if frame.params {
                // return type annotation after the parameter list
                let j = self.skip_ws_same_line(self.i);
                if j < self.chars.len() && self.chars[j] == ':' {
                    if let Some(end) = self.scan_type(self.skip_ws(j + 1), false) {
                        self.i = end;
                    }
                }
            }
        }
    }

    fn colon(&mut self) {
        // parameter annotation inside a params list
        if let Some(frame) = self.parens.last().copied() {
            if frame.params && self.brace_depth == frame.brace_depth {
                self.drop_optional_marker();
                if let Some(end) = self.scan_type(self.skip_ws(self.i + 1), true) {
                    self.i = end;
                    return;
                }
            }
        }

        // variable annotation: const x: T = …
        if self.var_state == VarState::Declarator {
            let in_params = self
                .parens
                .last()
                .is_some_and(|f| f.params && self.brace_depth == f.brace_depth);
            if !in_params {
                if let Some(end) = self.scan_type(self.skip_ws(self.i + 1), true) {
                    self.i = end;
                    return;
                }
            }
        }

        self.emit_char();
    }

    fn drop_optional_marker(&mut self) {
        let trimmed = self.out.trim_end();
        if trimmed.ends_with('?') {
            let len = trimmed.len() - 1;
            self.out.truncate(len);
        }
    }

    // --- classification ---

    fn is_params_paren(&self) -> bool {
        if self.prev_word.as_deref() == Some("function")
            || self.prev_prev_word.as_deref() == Some("function")
        {
            return true;
        }
        if self.prev_word.as_deref().is_some_and(|w| CONTROL_KEYWORDS.contains(&w))
            && self.last_sig != Some('.')
        {
            return false;
        }

        let Some(close) = self.matching_paren(self.i) else {
            return false;
        };
        let mut j = self.skip_ws(close + 1);
        if self.starts_with_at(j, "=>") {
            return true;
        }
        if j < self.chars.len() && self.chars[j] == ':' {
            if let Some(end) = self.scan_type(self.skip_ws(j + 1), false) {
                j = self.skip_ws(end);
                if self.starts_with_at(j, "=>") || (j < self.chars.len() && self.chars[j] == '{') {
                    return true;
                }
            }
        }
        // object or class method body: name(…) { … }
        if j < self.chars.len()
            && self.chars[j] == '{'
            && self.last_sig.is_some_and(|c| is_ident_char(c))
        {
            return true;
        }
        false
    }

    fn prev_is_value(&self) -> bool {
        matches!(self.last_sig, Some(c) if is_ident_char(c) || c == ')' || c == ']' || c == '"' || c == '\'' || c == '`')
    }

    // --- declaration skipping ---

    /// Skip `interface Name … { … }`; returns false when it does not look
    /// like a declaration.
    fn skip_interface(&mut self) -> bool {
        let j = self.skip_ws(self.i);
        if self.word_at(j).is_none() {
            return false;
        }

        let mut k = j;
        while k < self.chars.len() && self.chars[k] != '{' {
            k += 1;
        }
        let Some(end) = self.matching(k, '{', '}') else {
            return false;
        };
        self.i = end + 1;
        true
    }

    /// Validate and skip `type Name<…> = <type>;` starting right after the
    /// `type` keyword; returns the index past the declaration.
    fn scan_type_alias(&self, j: usize) -> Option<usize> {
        let j = self.skip_ws(j);
        let name_end = self.word_end(j)?;
        let mut k = self.skip_ws(name_end);

        if k < self.chars.len() && self.chars[k] == '<' {
            k = self.skip_ws(self.matching_angle(k)? + 1);
        }
        if k >= self.chars.len() || self.chars[k] != '=' || self.peek_at(k + 1) == Some('=') {
            return None;
        }

        let mut end = self.scan_type(self.skip_ws(k + 1), true)?;
        let after = self.skip_ws_same_line(end);
        if after < self.chars.len() && self.chars[after] == ';' {
            end = after + 1;
        }
        Some(end)
    }

    fn skip_to_line_end(&mut self) {
        while self.i < self.chars.len() && self.chars[self.i] != '\n' {
            self.i += 1;
        }
    }

    fn skip_to_statement_end(&mut self) {
        let mut depth = 0i32;
        while self.i < self.chars.len() {
            match self.chars[self.i] {
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
                ';' if depth <= 0 => {
                    self.i += 1;
                    return;
                }
                '\n' if depth <= 0 => return,
                _ => {}
            }
            self.i += 1;
        }
    }

    // --- type expression scanning ---

    /// Scan a type expression starting at `j`; returns the index just past
    /// it, or None when nothing type-like is present.
    fn scan_type(&self, j: usize, allow_brace: bool) -> Option<usize> {
        let mut j = self.skip_ws(j);
        if j < self.chars.len() && (self.chars[j] == '|' || self.chars[j] == '&') {
            j = self.skip_ws(j + 1);
        }

        let (mut end, mut was_group) = self.scan_type_primary(j, allow_brace)?;
        loop {
            let k = self.skip_ws(end);
            if k >= self.chars.len() {
                break;
            }
            let c = self.chars[k];
            if c == '.' || c == '|' || c == '&' {
                let (next, group) = self.scan_type_primary(self.skip_ws(k + 1), allow_brace)?;
                end = next;
                was_group = group;
            } else if was_group && self.starts_with_at(k, "=>") {
                // function type: (args) => ret
                let (next, group) = self.scan_type_primary(self.skip_ws(k + 2), allow_brace)?;
                end = next;
                was_group = group;
            } else {
                break;
            }
        }
        Some(end)
    }

    /// One type primary; the bool reports whether it was a parenthesised
    /// group (only those may be followed by a function-type arrow).
    fn scan_type_primary(&self, j: usize, allow_brace: bool) -> Option<(usize, bool)> {
        if j >= self.chars.len() {
            return None;
        }

        let c = self.chars[j];
        if is_ident_start(c) {
            let mut end = self.word_end(j)?;
            let word: String = self.chars[j..end].iter().collect();
            if matches!(word.as_str(), "typeof" | "keyof" | "readonly" | "new") {
                return self.scan_type_primary(self.skip_ws(end), allow_brace);
            }
            loop {
                if end < self.chars.len() && self.chars[end] == '<' {
                    end = self.matching_angle(end)? + 1;
                } else if end < self.chars.len() && self.chars[end] == '[' {
                    end = self.matching(end, '[', ']')? + 1;
                } else {
                    break;
                }
            }
            return Some((end, false));
        }
        if c == '(' {
            let mut end = self.matching(j, '(', ')')? + 1;
            while end < self.chars.len() && self.chars[end] == '[' {
                end = self.matching(end, '[', ']')? + 1;
            }
            return Some((end, true));
        }
        if c == '{' && allow_brace {
            return Some((self.matching(j, '{', '}')? + 1, false));
        }
        if c == '"' || c == '\'' {
            let mut k = j + 1;
            while k < self.chars.len() && self.chars[k] != c {
                if self.chars[k] == '\\' {
                    k += 1;
                }
                k += 1;
            }
            return (k < self.chars.len()).then_some((k + 1, false));
        }
        if c.is_ascii_digit() {
            let mut k = j;
            while k < self.chars.len() && (self.chars[k].is_ascii_digit() || self.chars[k] == '.') {
                k += 1;
            }
            return Some((k, false));
        }
        None
    }

    // --- scanning helpers ---

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).copied()
    }

    fn peek_at(&self, j: usize) -> Option<char> {
        self.chars.get(j).copied()
    }

    fn starts_with_at(&self, j: usize, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(offset, c)| self.chars.get(j + offset) == Some(&c))
    }

    fn skip_ws(&self, mut j: usize) -> usize {
        while j < self.chars.len() && self.chars[j].is_whitespace() {
            j += 1;
        }
        j
    }

    fn skip_ws_same_line(&self, mut j: usize) -> usize {
        while j < self.chars.len() && self.chars[j].is_whitespace() && self.chars[j] != '\n' {
            j += 1;
        }
        j
    }

    fn word_at(&self, j: usize) -> Option<String> {
        let end = self.word_end(j)?;
        Some(self.chars[j..end].iter().collect())
    }

    fn word_end(&self, j: usize) -> Option<usize> {
        if j >= self.chars.len() || !is_ident_start(self.chars[j]) {
            return None;
        }
        let mut end = j;
        while end < self.chars.len() && is_ident_char(self.chars[end]) {
            end += 1;
        }
        Some(end)
    }

    /// Index of the character matching `open` at `j`, skipping strings.
    fn matching(&self, j: usize, open: char, close: char) -> Option<usize> {
        let mut depth = 0i32;
        let mut k = j;
        while k < self.chars.len() {
            let c = self.chars[k];
            if c == '"' || c == '\'' || c == '`' {
                k += 1;
                while k < self.chars.len() && self.chars[k] != c {
                    if self.chars[k] == '\\' {
                        k += 1;
                    }
                    k += 1;
                }
            } else if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Some(k);
                }
            }
            k += 1;
        }
        None
    }

    fn matching_paren(&self, j: usize) -> Option<usize> {
        self.matching(j, '(', ')')
    }

    /// Matching `>` for a `<` at `j`; the `>` of `=>` does not count.
    fn matching_angle(&self, j: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut k = j;
        while k < self.chars.len() {
            match self.chars[k] {
                '<' => depth += 1,
                '>' if self.chars.get(k.wrapping_sub(1)) != Some(&'=') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                _ => {}
            }
            k += 1;
        }
        None
    }

    // --- verbatim copying ---

    fn emit_char(&mut self) {
        let c = self.chars[self.i];
        if !c.is_whitespace() {
            self.last_sig = Some(c);
        }
        self.out.push(c);
        self.i += 1;
    }

    fn copy_line_comment(&mut self) {
        while self.i < self.chars.len() && self.chars[self.i] != '\n' {
            self.out.push(self.chars[self.i]);
            self.i += 1;
        }
    }

    fn copy_block_comment(&mut self) {
        self.out.push(self.chars[self.i]);
        self.out.push(self.chars[self.i + 1]);
        self.i += 2;
        while self.i < self.chars.len() {
            if self.chars[self.i] == '*' && self.peek(1) == Some('/') {
                self.out.push('*');
                self.out.push('/');
                self.i += 2;
                return;
            }
            self.out.push(self.chars[self.i]);
            self.i += 1;
        }
    }

    fn copy_string(&mut self, quote: char) {
        self.last_sig = Some(quote);
        self.out.push(self.chars[self.i]);
        self.i += 1;
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            self.out.push(c);
            self.i += 1;
            if c == '\\' && self.i < self.chars.len() {
                self.out.push(self.chars[self.i]);
                self.i += 1;
            } else if c == quote {
                return;
            }
        }
    }

    /// Copy a template literal, including `${ … }` holes which may nest
    /// further template literals.
    fn copy_template(&mut self) {
        enum Mode {
            Template,
            Expr(i32),
        }

        self.last_sig = Some('`');
        let mut stack = vec![Mode::Template];
        self.out.push(self.chars[self.i]);
        self.i += 1;

        while self.i < self.chars.len() && !stack.is_empty() {
            let c = self.chars[self.i];
            let in_template = matches!(stack.last(), Some(Mode::Template));

            if in_template {
                self.out.push(c);
                self.i += 1;
                match c {
                    '\\' if self.i < self.chars.len() => {
                        self.out.push(self.chars[self.i]);
                        self.i += 1;
                    }
                    '`' => {
                        stack.pop();
                    }
                    '$' if self.peek(0) == Some('{') => {
                        self.out.push('{');
                        self.i += 1;
                        stack.push(Mode::Expr(0));
                    }
                    _ => {}
                }
                continue;
            }

            match c {
                '{' => {
                    if let Some(Mode::Expr(depth)) = stack.last_mut() {
                        *depth += 1;
                    }
                }
                '}' => {
                    let closed = match stack.last_mut() {
                        Some(Mode::Expr(depth)) if *depth == 0 => true,
                        Some(Mode::Expr(depth)) => {
                            *depth -= 1;
                            false
                        }
                        _ => false,
                    };
                    if closed {
                        stack.pop();
                    }
                }
                '`' => {
                    stack.push(Mode::Template);
                    self.out.push(c);
                    self.i += 1;
                    continue;
                }
                '"' | '\'' => {
                    self.copy_string(c);
                    continue;
                }
                _ => {}
            }
            self.out.push(c);
            self.i += 1;
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_passes_through() {
        let src = "const x = { a: 1, b: 'two' };\nprint(`${x.a}`);\n";
        assert_eq!(strip_types(src), src);
    }

    #[test]
    fn js_extension_is_untouched() {
        let src = "const x: notatype = 1;".to_string();
        let prepared = prepare(Path::new("stack.js"), src.clone()).unwrap();
        assert_eq!(prepared, src);
    }

    #[test]
    fn variable_annotation_is_stripped() {
        assert_eq!(strip_types("const x: string = 'a';"), "const x = 'a';");
        assert_eq!(strip_types("let n: number = 1;"), "let n = 1;");
    }

    #[test]
    fn parameter_annotations_are_stripped() {
        assert_eq!(
            strip_types("function f(a: string, b?: number) { return a; }"),
            "function f(a, b) { return a; }"
        );
    }

    #[test]
    fn return_type_is_stripped() {
        assert_eq!(strip_types("function f(): void { }"), "function f() { }");
    }

    #[test]
    fn arrow_function_annotations_are_stripped() {
        assert_eq!(
            strip_types("const f = (a: string): string => a;"),
            "const f = (a) => a;"
        );
    }

    #[test]
    fn function_type_parameter_annotation() {
        assert_eq!(
            strip_types("const run = (cb: (x: number) => void) => cb(1);"),
            "const run = (cb) => cb(1);"
        );
    }

    #[test]
    fn interface_declaration_is_removed() {
        let src = "interface Options { name: string; }\nconst o = { name: 'x' };";
        assert_eq!(strip_types(src), "\nconst o = { name: 'x' };");
    }

    #[test]
    fn exported_interface_is_removed() {
        let src = "export interface Options { a: number }\nconst k = 1;";
        assert_eq!(strip_types(src), " \nconst k = 1;");
    }

    #[test]
    fn type_alias_is_removed() {
        assert_eq!(strip_types("type Name = string;\nconst n = 'x';"), "\nconst n = 'x';");
        assert_eq!(
            strip_types("type Pair = { a: string } | null;\nconst p = null;"),
            "\nconst p = null;"
        );
    }

    #[test]
    fn as_cast_is_removed() {
        assert_eq!(strip_types("const v = data as string;"), "const v = data ;");
    }

    #[test]
    fn generics_on_function_declarations_are_removed() {
        assert_eq!(
            strip_types("function id<T>(x: T): T { return x; }"),
            "function id(x) { return x; }"
        );
    }

    #[test]
    fn object_literals_survive() {
        let src = "component('db', './db', { user: 'admin', settings: { a: 1 } });";
        assert_eq!(strip_types(src), src);
    }

    #[test]
    fn ternaries_survive() {
        let src = "const t = flag ? 1 : 2;";
        assert_eq!(strip_types(src), src);
        let in_call = "f(flag ? 'a' : 'b');";
        assert_eq!(strip_types(in_call), in_call);
    }

    #[test]
    fn control_flow_parens_are_not_params() {
        let src = "if (flag ? a : b) { g(); }\nwhile (m ? 1 : 0) { h(); }";
        assert_eq!(strip_types(src), src);
    }

    #[test]
    fn template_literals_survive() {
        let src = "const s = `${name}.{{ .stack }}.${opts.domain}`;";
        assert_eq!(strip_types(src), src);
        let nested = "const n = `a${`b${c}`}d`;";
        assert_eq!(strip_types(nested), nested);
    }

    #[test]
    fn import_renames_survive() {
        let src = "import { helper as h } from './helpers.js';";
        assert_eq!(strip_types(src), src);
    }

    #[test]
    fn import_type_is_removed() {
        assert_eq!(strip_types("import type { A } from './types';\nconst x = 1;"), "\nconst x = 1;");
    }

    #[test]
    fn strings_and_comments_are_verbatim() {
        let src = "// note: const x: string\nconst s = 'a: b';\n/* type X = 1; */";
        assert_eq!(strip_types(src), src);
    }

    #[test]
    fn union_annotations_are_stripped() {
        assert_eq!(strip_types("const v: string | null = null;"), "const v = null;");
    }

    #[test]
    fn generic_annotations_are_stripped() {
        assert_eq!(
            strip_types("const m: Map<string, number> = new Map();"),
            "const m = new Map();"
        );
    }
}
