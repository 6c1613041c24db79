//! Shared test support.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::executor::Executor;
use crate::model::{Component, OutputMeta};

/// Executor stub serving canned outputs keyed on (stack, component).
pub(crate) struct FakeExecutor {
    outputs: HashMap<(String, String), IndexMap<String, OutputMeta>>,
}

impl FakeExecutor {
    pub(crate) fn empty() -> Self {
        FakeExecutor { outputs: HashMap::new() }
    }

    pub(crate) fn with_output(stack: &str, component: &str, key: &str, value: Value) -> Self {
        let mut executor = Self::empty();
        executor.add_output(stack, component, key, value);
        executor
    }

    pub(crate) fn add_output(&mut self, stack: &str, component: &str, key: &str, value: Value) {
        let entry = self
            .outputs
            .entry((stack.to_string(), component.to_string()))
            .or_default();
        entry.insert(
            key.to_string(),
            OutputMeta { sensitive: false, value_type: json!("string"), value },
        );
    }
}

impl Executor for FakeExecutor {
    fn init(&self, _component: &Component) -> Result<(), AppError> {
        Ok(())
    }

    fn plan(&self, _component: &Component) -> Result<bool, AppError> {
        Ok(false)
    }

    fn apply(&self, _component: &Component) -> Result<(), AppError> {
        Ok(())
    }

    fn destroy(&self, _component: &Component) -> Result<(), AppError> {
        Ok(())
    }

    fn output(&self, component: &Component) -> Result<IndexMap<String, OutputMeta>, AppError> {
        self.outputs
            .get(&(component.stack.clone(), component.name.clone()))
            .cloned()
            .ok_or_else(|| AppError::EmptyState(component.name.clone()))
    }
}
