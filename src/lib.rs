//! comet: a programmable stack model around a Terraform-compatible binary.
//!
//! Stacks and components are declared in JavaScript/TypeScript, evaluated by
//! an embedded interpreter, resolved through a late-binding template pass,
//! materialised onto disk and driven through the external tool in order.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod executor;
pub mod generate;
pub mod kube;
pub mod model;
pub mod print;
pub mod registry;
pub mod runner;
pub mod script;
pub mod secrets;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

use std::fs;

use serde_json::Value;
use tracing::info;
use walkdir::WalkDir;

pub use config::Config;
pub use error::AppError;

/// List stacks, or the components of one stack.
pub fn list(config: &Config, stack: Option<&str>, details: bool) -> Result<(), AppError> {
    let stacks = registry::load_stacks(config)?;

    match stack {
        None => print::print_stacks(&stacks.order_by_name(), details),
        Some(name) => {
            let stack = stacks.get_stack(name)?;
            if stack.components.is_empty() {
                info!("no components found");
                return Ok(());
            }
            print::print_components(&stack.components);
        }
    }
    Ok(())
}

/// Show the changes the current configuration would make.
pub fn plan(config: &Config, stack: &str, components: &[String]) -> Result<(), AppError> {
    runner::for_each_component(config, stack, components, false, |component, executor| {
        executor.plan(component).map(|_changes| ())
    })
}

/// Create or update infrastructure.
pub fn apply(config: &Config, stack: &str, components: &[String]) -> Result<(), AppError> {
    runner::for_each_component(config, stack, components, false, |component, executor| {
        executor.apply(component)
    })
}

/// Destroy infrastructure, components in reverse declaration order.
pub fn destroy(config: &Config, stack: &str, components: &[String]) -> Result<(), AppError> {
    runner::for_each_component(config, stack, components, true, |component, executor| {
        executor.destroy(component)
    })
}

/// Initialize backends and providers without planning or applying.
pub fn init(config: &Config, stack: &str, components: &[String]) -> Result<(), AppError> {
    runner::for_each_component(config, stack, components, false, |component, executor| {
        executor.init(component)
    })
}

/// Show output values, optionally a single component or a single key.
pub fn output(
    config: &Config,
    stack: &str,
    component: Option<&str>,
    key: Option<&str>,
    json: bool,
) -> Result<(), AppError> {
    let filters: Vec<String> = component.map(|c| vec![c.to_string()]).unwrap_or_default();

    runner::for_each_component(config, stack, &filters, false, |component, executor| {
        let outputs = executor.output(component)?;

        if let Some(key) = key {
            let meta = outputs.get(key).ok_or_else(|| AppError::OutputKeyNotFound {
                key: key.to_string(),
                component: component.name.clone(),
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&meta.value)?);
            } else {
                println!("{}", format_output_value(&meta.value));
            }
            return Ok(());
        }

        if json {
            let mut object = serde_json::Map::new();
            for (name, meta) in &outputs {
                object.insert(name.clone(), meta.value.clone());
            }
            println!("{}", serde_json::to_string_pretty(&Value::Object(object))?);
        } else {
            for (name, meta) in &outputs {
                println!("{name} = {}", format_output_value(&meta.value));
            }
        }
        Ok(())
    })
}

fn format_output_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

/// Render a stack's kubeconfig to stdout, or merge it into the user's
/// kubeconfig when `save` is set.
pub fn kubeconfig(config: &Config, stack_name: &str, save: bool) -> Result<(), AppError> {
    let executor = executor::get_executor(config)?;
    let stacks = registry::load_stacks(config)?;
    let stack = stacks.get_stack(stack_name)?;

    let Some(kubeconfig) = &stack.kubeconfig else {
        return Err(AppError::Kubeconfig(format!("no kubeconfig defined for stack: {stack_name}")));
    };

    if save {
        kube::save(kubeconfig, config, &stacks, executor.as_ref(), stack_name)?;
        println!("Merged kubeconfig for stack {stack_name}");
    } else {
        let rendered = kube::render(kubeconfig, config, &stacks, executor.as_ref(), stack_name)?;
        print!("{rendered}");
    }
    Ok(())
}

/// Write `index.d.ts` into the stacks directory for editor support.
pub fn write_types(config: &Config) -> Result<(), AppError> {
    let path = registry::write_type_defs(&config.stacks_dir)?;
    println!("Generated TypeScript definitions at {}", path.display());
    Ok(())
}

/// Run the configured bootstrap steps.
pub fn run_bootstrap(config: &Config, force: bool) -> Result<(), AppError> {
    if config.bootstrap.is_empty() {
        println!("No bootstrap configuration found in comet.yaml");
        println!("\nTo configure bootstrap, add a 'bootstrap' section:\n");
        println!(
            "bootstrap:\n  - name: sops-key\n    type: secret\n    source: op://vault/item/field\n    target: ~/.config/sops/age/keys.txt\n    mode: \"0600\""
        );
        return Ok(());
    }

    bootstrap::run(config, force)
}

pub fn bootstrap_status(config: &Config) -> Result<(), AppError> {
    bootstrap::status(config)
}

pub fn bootstrap_clear() -> Result<(), AppError> {
    bootstrap::clear()
}

/// Delete generated files and tool caches under the current directory.
pub fn clean(_config: &Config) -> Result<(), AppError> {
    let mut walker = WalkDir::new(".").into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| AppError::config(format!("cannot walk directory: {e}")))?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if entry.file_type().is_dir() {
            if name == ".terraform" || name == "terraform.tfstate.d" {
                println!("Deleting {}", entry.path().display());
                fs::remove_dir_all(entry.path())?;
                walker.skip_current_dir();
            }
            continue;
        }

        let generated = name == generate::BACKEND_FILE
            || name == generate::PROVIDERS_FILE
            || name == ".terraform.lock.hcl"
            || name.ends_with(".tfvars.json")
            || name.ends_with(".planfile");
        if generated {
            println!("Deleting {}", entry.path().display());
            fs::remove_file(entry.path())?;
        }
    }

    Ok(())
}
