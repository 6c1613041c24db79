//! File materialiser: everything the external tool expects to find in a
//! component directory before it runs.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;
use crate::model::Component;

pub const BACKEND_FILE: &str = "backend.tf.json";
pub const PROVIDERS_FILE: &str = "providers_gen.tf";

const NO_VALUE: &str = "<no value>";

/// Provider properties that get a remote-state local fallback when their
/// upstream component has no state yet. Unknown properties emit `null`.
struct LocalFallback {
    property: &'static str,
    suffix: &'static str,
    output: &'static str,
    default: &'static str,
}

const LOCAL_FALLBACKS: &[LocalFallback] = &[
    LocalFallback {
        property: "host",
        suffix: "kube_host",
        output: "kube_host",
        default: "\"https://127.0.0.1\"",
    },
    LocalFallback {
        property: "cluster_ca_certificate",
        suffix: "kube_cert",
        output: "kube_cert",
        default: "\"\"",
    },
];

pub fn vars_file_name(component: &Component) -> String {
    format!("{}-{}.tfvars.json", component.stack, component.name)
}

pub fn plan_file_name(component: &Component) -> String {
    format!("{}-{}.planfile", component.stack, component.name)
}

/// Write vars, backend and providers files; returns the vars file name.
pub fn write_provision_files(
    component: &Component,
    generate_backend: bool,
) -> Result<String, AppError> {
    let vars_file = vars_file_name(component);
    write_json(&Value::Object(component.inputs.clone()), &component.path, &vars_file)?;

    if generate_backend {
        write_backend_json(component)?;
    }

    write_providers_tf(component)?;
    Ok(vars_file)
}

fn write_backend_json(component: &Component) -> Result<(), AppError> {
    let mut backend = Map::new();
    backend.insert(component.backend.kind.clone(), Value::Object(component.backend.config.clone()));

    let mut terraform = Map::new();
    terraform.insert("backend".to_string(), Value::Object(backend));

    let mut root = Map::new();
    root.insert("terraform".to_string(), Value::Object(terraform));

    write_json(&Value::Object(root), &component.path, BACKEND_FILE)
}

fn write_json(value: &Value, dir: &str, filename: &str) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)?;
    let path = Path::new(dir).join(filename);
    debug!(path = %path.display(), "writing generated file");
    fs::write(path, text)?;
    Ok(())
}

/// Emit `providers_gen.tf`: one block per provider, remote-state fallbacks for
/// failed dependencies first, appended lines last. Key order follows script
/// insertion order, so output is reproducible.
pub fn write_providers_tf(component: &Component) -> Result<(), AppError> {
    if component.providers.is_empty() {
        return Ok(());
    }

    let deps = &component.provider_dependencies;
    let mut out = String::new();

    if !deps.is_empty() {
        write_remote_state_data(&mut out, component);
        write_local_fallbacks(&mut out, deps);
        write_variable_overrides(&mut out, deps);
    }

    for (name, value) in &component.providers {
        out.push_str(&format!("provider \"{name}\" {{"));
        if let Value::Object(config) = value {
            let body = provider_config_block(2, config, deps);
            if !body.is_empty() {
                out.push('\n');
                out.push_str(&body);
            }
        }
        out.push_str("}\n\n");
    }

    if let Some(lines) = component.appends.get("providers") {
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
    }

    let content = format!("{}\n", out.trim());
    fs::write(Path::new(&component.path).join(PROVIDERS_FILE), content)?;
    Ok(())
}

fn provider_config_block(
    indent: usize,
    config: &Map<String, Value>,
    deps: &IndexMap<String, String>,
) -> String {
    let pad = " ".repeat(indent);
    let mut out = String::new();

    for (key, value) in config {
        // alias is only meaningful at the top provider level
        if key == "alias" && indent > 2 {
            continue;
        }

        if let Value::Object(nested) = value {
            out.push_str(&format!("{pad}{key} {{\n"));
            out.push_str(&provider_config_block(indent + 2, nested, deps));
            out.push_str(&format!("{pad}}}\n"));
            continue;
        }

        if value.is_null() {
            out.push_str(&format!("{pad}{key} = null\n"));
            continue;
        }

        let text = scalar_text(value);
        if !deps.is_empty() && text == NO_VALUE {
            match local_reference(key, deps) {
                Some(reference) => out.push_str(&format!("{pad}{key} = {reference}\n")),
                None => out.push_str(&format!("{pad}{key} = null\n")),
            }
        } else if is_expression(&text) {
            out.push_str(&format!("{pad}{key} = {text}\n"));
        } else if BASE64.decode(&text).is_ok() {
            out.push_str(&format!("{pad}{key} = base64decode(\"{text}\")\n"));
        } else {
            out.push_str(&format!("{pad}{key} = \"{text}\"\n"));
        }
    }

    out
}

fn write_remote_state_data(out: &mut String, component: &Component) {
    out.push_str("# Auto-generated remote state data sources for component dependencies\n");
    for dep in component.provider_dependencies.keys() {
        out.push_str(&format!("data \"terraform_remote_state\" \"{dep}\" {{\n"));
        out.push_str(&format!("  backend = \"{}\"\n", component.backend.kind));
        out.push_str("  config = {\n");
        for (key, value) in &component.backend.config {
            let mut text = scalar_text(value);
            // the backend path of the dependency differs only by component name
            if text.contains(&component.name) {
                text = text.replace(&component.name, dep);
            }
            out.push_str(&format!("    {key} = \"{text}\"\n"));
        }
        out.push_str("  }\n}\n\n");
    }
}

fn write_local_fallbacks(out: &mut String, deps: &IndexMap<String, String>) {
    out.push_str("# Locals with safe fallbacks for component dependencies\n");
    out.push_str("locals {\n");
    for dep in deps.keys() {
        for fallback in LOCAL_FALLBACKS {
            out.push_str(&format!(
                "  {dep}_{suffix} = try(\n    data.terraform_remote_state.{dep}.outputs.{output},\n    var.{dep}_{suffix},\n    {default}\n  )\n",
                suffix = fallback.suffix,
                output = fallback.output,
                default = fallback.default,
            ));
        }
    }
    out.push_str("}\n\n");
}

fn write_variable_overrides(out: &mut String, deps: &IndexMap<String, String>) {
    for dep in deps.keys() {
        out.push_str(&format!("# Variables for manual override of {dep} outputs (optional)\n"));
        for fallback in LOCAL_FALLBACKS {
            out.push_str(&format!(
                "variable \"{dep}_{suffix}\" {{\n  description = \"{property} from {dep} component (auto-detected from remote state)\"\n  type        = string\n  default     = null\n}}\n\n",
                suffix = fallback.suffix,
                property = fallback.property,
            ));
        }
    }
}

fn local_reference(property: &str, deps: &IndexMap<String, String>) -> Option<String> {
    for dep in deps.keys() {
        for fallback in LOCAL_FALLBACKS {
            if fallback.property == property {
                return Some(format!("local.{dep}_{suffix}", suffix = fallback.suffix));
            }
        }
    }
    None
}

fn is_expression(text: &str) -> bool {
    text.starts_with("data.")
        || text.starts_with("module.")
        || text.starts_with("local.")
        || text.starts_with("var.")
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => crate::template::render_value(other),
    }
}
