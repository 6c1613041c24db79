//! Per-component orchestration shared by the provisioning subcommands.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;
use crate::executor::{self, Executor};
use crate::model::{Component, Stacks};
use crate::registry;
use crate::template::Templater;

/// Run `action` over the selected components of a stack, in declaration
/// order (reversed for destroy). Each component is copied to the work dir
/// and resolved to completion before the next one is touched.
pub fn for_each_component<F>(
    config: &Config,
    stack_name: &str,
    filters: &[String],
    reverse: bool,
    mut action: F,
) -> Result<(), AppError>
where
    F: FnMut(&Component, &dyn Executor) -> Result<(), AppError>,
{
    let executor = executor::get_executor(config)?;
    let stacks = registry::load_stacks(config)?;
    let stack = stacks.get_stack(stack_name)?;

    let mut components = stack.select_components(filters)?;
    if reverse {
        components.reverse();
    }

    for mut component in components {
        component.ensure_path(config, true)?;
        resolve_component(config, &stacks, executor.as_ref(), &mut component)?;
        action(&component, executor.as_ref())?;
    }

    Ok(())
}

/// Resolve backend, inputs and providers of one component. A fresh templater
/// per component keeps the failed-dependency tracker scoped.
pub fn resolve_component(
    config: &Config,
    stacks: &Stacks,
    executor: &dyn Executor,
    component: &mut Component,
) -> Result<(), AppError> {
    debug!(stack = %component.stack, component = %component.name, "resolving component");
    let templater = Templater::new(config, stacks, executor, &component.stack)?;

    let mut extra = Map::new();
    extra.insert("component".to_string(), Value::String(component.name.clone()));

    component.backend.config = templater.resolve_map(&component.backend.config, Some(&extra))?;
    component.inputs = templater.resolve_map(&component.inputs, Some(&extra))?;
    component.providers = templater.resolve_map(&component.providers, Some(&extra))?;
    component.provider_dependencies = templater.take_failed_deps();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, Stack};
    use crate::testing::FakeExecutor;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn resolution_covers_backend_inputs_and_providers() {
        let mut stack = Stack::new("dev.stack.js", "js");
        stack.name = "dev".to_string();
        stack.components = vec![Component {
            stack: "dev".to_string(),
            name: "app".to_string(),
            backend: Backend {
                kind: "gcs".to_string(),
                config: object(json!({ "prefix": "org/{{ .stack }}/{{ .component }}" })),
            },
            inputs: object(json!({ "dburl": r#"{{ (state "dev" "db").url }}"# })),
            providers: object(json!({ "kubernetes": { "host": r#"{{ (state "dev" "db").host }}"# } })),
            ..Default::default()
        }, Component {
            stack: "dev".to_string(),
            name: "db".to_string(),
            ..Default::default()
        }];

        let mut stacks = Stacks::default();
        stacks.add_stack(stack).unwrap();

        let config = Config { work_dir: String::new(), ..Default::default() };
        let executor = FakeExecutor::with_output("dev", "db", "url", json!("postgres://db"));

        let mut component = stacks.get_stack("dev").unwrap().components[0].clone();
        resolve_component(&config, &stacks, &executor, &mut component).unwrap();

        assert_eq!(component.backend.config.get("prefix"), Some(&json!("org/dev/app")));
        assert_eq!(component.inputs.get("dburl"), Some(&json!("postgres://db")));
        // db has a url output but no host output, still resolved via state map
        assert_eq!(
            component.providers.get("kubernetes"),
            Some(&json!({ "host": "<no value>" }))
        );
        assert!(component.provider_dependencies.is_empty());
    }

    #[test]
    fn missing_upstream_marks_provider_dependencies() {
        let mut stack = Stack::new("dev.stack.js", "js");
        stack.name = "dev".to_string();
        stack.components = vec![
            Component {
                stack: "dev".to_string(),
                name: "app".to_string(),
                providers: object(
                    json!({ "kubernetes": { "host": r#"{{ (state "dev" "gke").kube_host }}"# } }),
                ),
                ..Default::default()
            },
            Component { stack: "dev".to_string(), name: "gke".to_string(), ..Default::default() },
        ];

        let mut stacks = Stacks::default();
        stacks.add_stack(stack).unwrap();

        let config = Config { work_dir: String::new(), ..Default::default() };
        let executor = FakeExecutor::empty();

        let mut component = stacks.get_stack("dev").unwrap().components[0].clone();
        resolve_component(&config, &stacks, &executor, &mut component).unwrap();

        assert_eq!(component.provider_dependencies.get("gke"), Some(&"dev".to_string()));
    }
}
