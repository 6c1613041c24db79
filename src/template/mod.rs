//! Late binding: resolve `{{ … }}` directives inside arbitrary value trees by
//! round-tripping them through JSON and a Go-style text template pass.

mod gotmpl;

pub use gotmpl::{render_value, Engine, TemplateFn};

use std::cell::RefCell;
use std::path;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::Config;
use crate::error::AppError;
use crate::executor::Executor;
use crate::model::Stacks;

/// One resolution pass over a single component (or kubeconfig). Owns the
/// failed-dependency tracker, which therefore never leaks across components.
pub struct Templater<'a> {
    config: &'a Config,
    stacks: &'a Stacks,
    executor: &'a dyn Executor,
    data: Map<String, Value>,
    failed_deps: RefCell<IndexMap<String, String>>,
}

impl<'a> Templater<'a> {
    pub fn new(
        config: &'a Config,
        stacks: &'a Stacks,
        executor: &'a dyn Executor,
        stack_name: &str,
    ) -> Result<Self, AppError> {
        let stacks_dir = path::absolute(&config.stacks_dir)?;
        let stack = stacks.get_stack(stack_name)?;

        let mut data = Map::new();
        data.insert(
            "stacks_dir".to_string(),
            Value::String(stacks_dir.to_string_lossy().into_owned()),
        );
        data.insert("stack".to_string(), Value::String(stack.name.clone()));

        // stack options merge shallowly; fixed keys win
        if let Value::Object(options) = &stack.options {
            for (key, value) in options {
                data.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        Ok(Templater {
            config,
            stacks,
            executor,
            data,
            failed_deps: RefCell::new(IndexMap::new()),
        })
    }

    /// Resolve all directives in a value tree. Serialisation means templates
    /// may produce structured JSON, not only strings; the `\"` unescape keeps
    /// quoted directive arguments intact through the round-trip.
    pub fn resolve_value(
        &self,
        src: &Value,
        extra: Option<&Map<String, Value>>,
    ) -> Result<Value, AppError> {
        let serialized = serde_json::to_string(src)?;
        let unescaped = serialized.replace("\\\"", "\"");

        let mut data = self.data.clone();
        if let Some(extra) = extra {
            for (key, value) in extra {
                data.insert(key.clone(), value.clone());
            }
        }

        let mut engine = Engine::new();
        engine.add_func("state", Box::new(|args: &[Value]| self.state(args)));

        let rendered = engine.render(&unescaped, &Value::Object(data))?;
        serde_json::from_str(&rendered)
            .map_err(|e| AppError::template(format!("resolved value is not valid JSON: {e}")))
    }

    pub fn resolve_map(
        &self,
        src: &Map<String, Value>,
        extra: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, AppError> {
        match self.resolve_value(&Value::Object(src.clone()), extra)? {
            Value::Object(resolved) => Ok(resolved),
            other => Err(AppError::template(format!("expected object after resolution, got {other}"))),
        }
    }

    /// Failed upstream lookups recorded so far; draining resets the tracker.
    pub fn take_failed_deps(&self) -> IndexMap<String, String> {
        std::mem::take(&mut *self.failed_deps.borrow_mut())
    }

    /// `state "S" "C"`: outputs of component C in stack S, stringified. On a
    /// missing upstream state the dependency is recorded and nil returned so
    /// provider generation can emit safe fallbacks.
    fn state(&self, args: &[Value]) -> Value {
        let (Some(Value::String(stack_name)), Some(Value::String(component_name))) =
            (args.first(), args.get(1))
        else {
            return Value::Null;
        };

        let Ok(ref_stack) = self.stacks.get_stack(stack_name) else {
            return Value::Null;
        };
        let Ok(ref_component) = ref_stack.component(component_name) else {
            return Value::Null;
        };

        let mut component = ref_component.clone();
        if component.ensure_path(self.config, false).is_err() {
            return Value::Null;
        }

        let outputs = self
            .executor
            .init(&component)
            .and_then(|()| self.executor.output(&component));
        match outputs {
            Ok(outputs) => {
                let mut map = Map::new();
                for (key, meta) in outputs {
                    map.insert(key, Value::String(meta.as_string()));
                }
                Value::Object(map)
            }
            Err(err) => {
                warn!(stack = %stack_name, component = %component_name, %err, "state unavailable, recording dependency");
                self.failed_deps
                    .borrow_mut()
                    .insert(component_name.clone(), stack_name.clone());
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Stack};
    use crate::testing::FakeExecutor;
    use serde_json::json;

    fn test_stacks() -> Stacks {
        let mut stack = Stack::new("dev.stack.js", "js");
        stack.name = "dev".to_string();
        stack.options = json!({ "settings": { "domain_name": "example.io" } });
        stack.components = vec![
            Component { stack: "dev".to_string(), name: "db".to_string(), ..Default::default() },
            Component { stack: "dev".to_string(), name: "app".to_string(), ..Default::default() },
        ];

        let mut stacks = Stacks::default();
        stacks.add_stack(stack).unwrap();
        stacks
    }

    fn test_config() -> Config {
        Config { work_dir: String::new(), ..Default::default() }
    }

    #[test]
    fn trees_without_directives_round_trip_unchanged() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::empty();
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        let tree = json!({
            "name": "app",
            "replicas": 3,
            "nested": { "flag": true, "list": [1, "two", null] }
        });
        assert_eq!(templater.resolve_value(&tree, None).unwrap(), tree);
    }

    #[test]
    fn stack_and_component_substitute() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::empty();
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        let mut extra = Map::new();
        extra.insert("component".to_string(), json!("app"));

        let tree = json!({ "prefix": "org/stacks/{{ .stack }}/{{ .component }}" });
        let resolved = templater.resolve_value(&tree, Some(&extra)).unwrap();
        assert_eq!(resolved, json!({ "prefix": "org/stacks/dev/app" }));
    }

    #[test]
    fn stack_options_surface_in_template_data() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::empty();
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        let tree = json!({ "domain": "app.{{ .stack }}.{{ .settings.domain_name }}" });
        let resolved = templater.resolve_value(&tree, None).unwrap();
        assert_eq!(resolved, json!({ "domain": "app.dev.example.io" }));
    }

    #[test]
    fn state_lookup_resolves_upstream_output() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::with_output("dev", "db", "url", json!("postgres://db.internal"));
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        let tree = json!({ "dburl": r#"{{ (state "dev" "db").url }}"# });
        let resolved = templater.resolve_value(&tree, None).unwrap();
        assert_eq!(resolved, json!({ "dburl": "postgres://db.internal" }));
        assert!(templater.take_failed_deps().is_empty());
    }

    #[test]
    fn missing_state_records_failed_dependency() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::empty();
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        let tree = json!({ "host": r#"{{ (state "dev" "db").kube_host }}"# });
        let resolved = templater.resolve_value(&tree, None).unwrap();
        assert_eq!(resolved, json!({ "host": "<no value>" }));

        let deps = templater.take_failed_deps();
        assert_eq!(deps.get("db"), Some(&"dev".to_string()));
        // draining resets the tracker
        assert!(templater.take_failed_deps().is_empty());
    }

    #[test]
    fn unknown_component_yields_no_value_without_tracking() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::empty();
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        let tree = json!({ "x": r#"{{ (state "dev" "ghost").url }}"# });
        let resolved = templater.resolve_value(&tree, None).unwrap();
        assert_eq!(resolved, json!({ "x": "<no value>" }));
        assert!(templater.take_failed_deps().is_empty());
    }

    #[test]
    fn state_produces_structured_values_for_whole_field() {
        let config = test_config();
        let stacks = test_stacks();
        let executor = FakeExecutor::with_output("dev", "db", "url", json!("postgres://db"));
        let templater = Templater::new(&config, &stacks, &executor, "dev").unwrap();

        // the supported contract is selecting a property off the state result;
        // rendering the whole map would print Go-style, which is not JSON
        let tree = json!({ "all": r#"{{ (state "dev" "db").url }}-suffix"# });
        let resolved = templater.resolve_value(&tree, None).unwrap();
        assert_eq!(resolved, json!({ "all": "postgres://db-suffix" }));
    }
}
