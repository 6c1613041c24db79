//! QuickJS-backed script host.
//!
//! The DSL itself lives in a JavaScript prelude evaluated before the user
//! script; it accumulates one stack object which the host serializes and
//! decodes after evaluation. Only the impure operations (env access, secret
//! resolution, printing) cross into Rust. Scripts are evaluated as ES
//! modules so relative imports resolve against the importing file.

use std::fs;
use std::path::{Path, PathBuf};

use rquickjs::function::Func;
use rquickjs::loader::{Loader, Resolver};
use rquickjs::module::Declared;
use rquickjs::{CatchResultExt, Context, Ctx, Error, Exception, Module, Runtime};
use tracing::debug;

use crate::error::AppError;
use crate::model::Stack;
use crate::secrets::{self, SecretDefaults};

use super::{bundle, ScriptHost};

const PRELUDE: &str = include_str!("prelude.js");

pub struct JsHost;

impl JsHost {
    pub fn new() -> Self {
        JsHost
    }
}

impl ScriptHost for JsHost {
    fn parse(&self, path: &Path) -> Result<Stack, AppError> {
        debug!(path = %path.display(), "evaluating stack script");

        let stack_json = eval_stack_script(path)?;
        let mut stack: Stack = serde_json::from_str(&stack_json)
            .map_err(|e| script_error(path, format!("script produced an invalid stack: {e}")))?;

        stack.path = path.to_string_lossy().into_owned();
        stack.kind = "js".to_string();

        // appends are shared between a stack and its components; distribute
        // after evaluation so append() calls after component() are visible
        for component in &mut stack.components {
            component.appends = stack.appends.clone();
        }

        Ok(stack)
    }
}

fn eval_stack_script(path: &Path) -> Result<String, AppError> {
    let source = fs::read_to_string(path)?;
    let source = bundle::prepare(path, source)?;

    let runtime = Runtime::new().map_err(|e| script_error(path, e.to_string()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    runtime.set_loader(StackResolver { base }, StackLoader);

    let context = Context::full(&runtime).map_err(|e| script_error(path, e.to_string()))?;

    context.with(|ctx| -> Result<String, AppError> {
        register_host_functions(&ctx).map_err(|e| script_error(path, e.to_string()))?;

        ctx.eval::<(), _>(PRELUDE)
            .catch(&ctx)
            .map_err(|e| script_error(path, e.to_string()))?;

        let name = path.to_string_lossy();
        Module::evaluate(ctx.clone(), name.as_ref(), source)
            .catch(&ctx)
            .map_err(|e| script_error(path, e.to_string()))?
            .finish::<()>()
            .catch(&ctx)
            .map_err(|e| script_error(path, e.to_string()))?;

        ctx.eval::<String, _>("JSON.stringify(globalThis.__comet_stack())")
            .catch(&ctx)
            .map_err(|e| script_error(path, e.to_string()))
    })
}

fn register_host_functions(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    globals.set("__comet_print", Func::from(|line: String| println!("{line}")))?;

    globals.set(
        "__comet_env_get",
        Func::from(|key: String| std::env::var(&key).unwrap_or_default()),
    )?;

    globals.set(
        "__comet_env_set",
        Func::from(|key: String, value: String| {
            std::env::set_var(key, value);
        }),
    )?;

    globals.set(
        "__comet_secrets_get",
        Func::from(|ctx: Ctx<'_>, reference: String| -> rquickjs::Result<String> {
            match secrets::get(&reference) {
                Ok(value) => Ok(value),
                Err(err) => Err(Exception::throw_message(&ctx, &err.to_string())),
            }
        }),
    )?;

    globals.set(
        "__comet_secret_get",
        Func::from(
            |ctx: Ctx<'_>, path: String, provider: String, default_path: String| -> rquickjs::Result<String> {
                let defaults = SecretDefaults { provider, path: default_path };
                let reference = secrets::expand_shorthand(&path, &defaults);
                match secrets::get(&reference) {
                    Ok(value) => Ok(value),
                    Err(err) => Err(Exception::throw_message(&ctx, &err.to_string())),
                }
            },
        ),
    )?;

    Ok(())
}

fn script_error(path: &Path, message: impl Into<String>) -> AppError {
    AppError::Script { path: path.display().to_string(), message: message.into() }
}

/// Resolves relative imports against the importing file, probing `.js` and
/// `.ts` when the extension is omitted. Bare specifiers are rejected: stack
/// bundles are self-contained.
struct StackResolver {
    base: PathBuf,
}

impl Resolver for StackResolver {
    fn resolve(&mut self, _ctx: &Ctx<'_>, base: &str, name: &str) -> rquickjs::Result<String> {
        if !name.starts_with("./") && !name.starts_with("../") {
            return Err(Error::new_resolving(base, name));
        }

        let base_dir = Path::new(base)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.base.clone());

        let joined = base_dir.join(name);
        for candidate in candidates(&joined) {
            if candidate.is_file() {
                return Ok(candidate.to_string_lossy().into_owned());
            }
        }

        Err(Error::new_resolving(base, name))
    }
}

fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut list = vec![path.to_path_buf()];
    if path.extension().is_none() {
        list.push(path.with_extension("js"));
        list.push(path.with_extension("ts"));
    }
    list
}

struct StackLoader;

impl Loader for StackLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Module<'js, Declared>> {
        let path = Path::new(name);
        let source = fs::read_to_string(path).map_err(|_| Error::new_loading(name))?;
        let source = bundle::prepare(path, source).map_err(|_| Error::new_loading(name))?;
        Module::declare(ctx.clone(), name, source)
    }
}
