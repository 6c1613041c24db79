//! Table output for the list subcommand.

use comfy_table::Table;
use serde_json::Value;

use crate::model::{Component, Stack};

pub fn print_stacks(stacks: &[&Stack], details: bool) {
    let mut table = Table::new();

    if details {
        table.set_header(vec!["stack", "type", "path", "description", "owner", "tags", "custom"]);
        for stack in stacks {
            let metadata = stack.metadata.clone().unwrap_or_default();
            let custom: Vec<String> =
                metadata.custom.iter().map(|(k, v)| format!("{k}={}", scalar(v))).collect();
            table.add_row(vec![
                stack.name.clone(),
                stack.kind.clone(),
                stack.path.clone(),
                metadata.description,
                metadata.owner,
                metadata.tags.join(","),
                custom.join("\n"),
            ]);
        }
    } else {
        table.set_header(vec!["stack", "type", "path"]);
        for stack in stacks {
            table.add_row(vec![stack.name.clone(), stack.kind.clone(), stack.path.clone()]);
        }
    }

    println!("{table}");
}

pub fn print_components(components: &[Component]) {
    let mut table = Table::new();
    table.set_header(vec!["component", "path", "vars"]);

    let mut sorted: Vec<&Component> = components.iter().collect();
    sorted.sort_by_key(|c| c.name.to_lowercase());

    for component in sorted {
        let vars: Vec<String> =
            component.inputs.iter().map(|(k, v)| format!("{k}={}", scalar(v))).collect();
        table.add_row(vec![component.name.clone(), component.path.clone(), vars.join("\n")]);
    }

    println!("{table}");
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
