use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

use super::{Backend, Component, Kubeconfig};

/// Free-form stack metadata surfaced by `comet list -d`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Custom fields, preserved in script insertion order.
    #[serde(default)]
    pub custom: Map<String, Value>,
}

/// One parsed stack script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    /// Opaque options object surfaced into template data.
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub backend: Backend,
    /// Block name → lines appended verbatim to the generated file.
    #[serde(default)]
    pub appends: IndexMap<String, Vec<String>>,
    /// Components in script declaration order; this is the apply order.
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub kubeconfig: Option<Kubeconfig>,
}

impl Stack {
    pub fn new(path: impl Into<String>, kind: impl Into<String>) -> Self {
        Stack { path: path.into(), kind: kind.into(), ..Default::default() }
    }

    /// A stack is usable iff it declared a name and at least one component.
    pub fn valid(&self) -> bool {
        !self.name.is_empty() && !self.components.is_empty()
    }

    pub fn component(&self, name: &str) -> Result<&Component, AppError> {
        self.components.iter().find(|c| c.name == name).ok_or_else(|| {
            AppError::ComponentNotFound { component: name.to_string(), stack: self.name.clone() }
        })
    }

    /// Components to act on, cloned in declaration order. An empty filter
    /// selects all components; filter entries keep their given order.
    pub fn select_components(&self, filters: &[String]) -> Result<Vec<Component>, AppError> {
        if self.components.is_empty() {
            return Err(AppError::NoComponents(self.name.clone()));
        }

        if filters.is_empty() {
            return Ok(self.components.clone());
        }

        let mut selected = Vec::with_capacity(filters.len());
        for name in filters {
            selected.push(self.component(name)?.clone());
        }
        Ok(selected)
    }
}

/// All discovered stacks, unique by name.
#[derive(Debug, Default)]
pub struct Stacks {
    items: Vec<Stack>,
}

impl Stacks {
    pub fn add_stack(&mut self, stack: Stack) -> Result<(), AppError> {
        if self.items.iter().any(|s| s.name == stack.name) {
            return Err(AppError::StackExists(stack.name));
        }
        self.items.push(stack);
        Ok(())
    }

    pub fn get_stack(&self, name: &str) -> Result<&Stack, AppError> {
        self.items
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AppError::StackNotFound(name.to_string()))
    }

    /// All stacks sorted case-insensitively by name, for listing.
    pub fn order_by_name(&self) -> Vec<&Stack> {
        let mut stacks: Vec<&Stack> = self.items.iter().collect();
        stacks.sort_by_key(|s| s.name.to_lowercase());
        stacks
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_with_components(name: &str, components: &[&str]) -> Stack {
        let mut stack = Stack::new(format!("{name}.stack.js"), "js");
        stack.name = name.to_string();
        stack.components = components
            .iter()
            .map(|c| Component {
                stack: name.to_string(),
                name: c.to_string(),
                ..Default::default()
            })
            .collect();
        stack
    }

    #[test]
    fn valid_requires_name_and_component() {
        let mut stack = Stack::new("empty.stack.js", "js");
        assert!(!stack.valid());

        stack.name = "dev".to_string();
        assert!(!stack.valid());

        stack.components.push(Component::default());
        assert!(stack.valid());
    }

    #[test]
    fn duplicate_stack_names_are_rejected() {
        let mut stacks = Stacks::default();
        let first = stack_with_components("dev", &["app"]);
        let second = stack_with_components("dev", &["db"]);

        stacks.add_stack(first).unwrap();
        let err = stacks.add_stack(second).unwrap_err();
        assert!(matches!(err, AppError::StackExists(name) if name == "dev"));

        // the first registration survives
        assert_eq!(stacks.get_stack("dev").unwrap().components[0].name, "app");
    }

    #[test]
    fn select_components_keeps_declaration_order() {
        let stack = stack_with_components("dev", &["a", "b", "c"]);
        let all = stack.select_components(&[]).unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn select_components_honours_filter_order() {
        let stack = stack_with_components("dev", &["a", "b", "c"]);
        let picked = stack.select_components(&["c".to_string(), "a".to_string()]).unwrap();
        let names: Vec<&str> = picked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["c", "a"]);
    }

    #[test]
    fn select_components_unknown_name_errors() {
        let stack = stack_with_components("dev", &["a"]);
        let err = stack.select_components(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::ComponentNotFound { .. }));
    }

    #[test]
    fn order_by_name_is_case_insensitive() {
        let mut stacks = Stacks::default();
        stacks.add_stack(stack_with_components("Prod", &["x"])).unwrap();
        stacks.add_stack(stack_with_components("dev", &["x"])).unwrap();
        let names: Vec<&str> = stacks.order_by_name().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["dev", "Prod"]);
    }
}
