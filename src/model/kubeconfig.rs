use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cluster access definitions attached to a stack by the `kubeconfig()` DSL
/// call. `current` selects which cluster becomes the current context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub clusters: Vec<KubeCluster>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubeCluster {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub exec_apiversion: String,
    #[serde(default)]
    pub exec_command: String,
    /// May arrive as a list or as a string: templates often produce a
    /// serialized array. Normalized just before rendering.
    #[serde(default)]
    pub exec_args: Value,
}

/// Normalize `exec_args` to a string list, whatever shape the script or the
/// templater produced: a list, a JSON array string, a `[a b c]` style string,
/// or a single bare string.
pub fn normalize_exec_args(args: &Value) -> Option<Vec<String>> {
    match args {
        Value::Null => None,
        Value::Array(items) => Some(items.iter().map(scalar_text).collect()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if s.starts_with('[') && s.ends_with(']') {
                if let Ok(parsed) = serde_json::from_str::<Vec<Value>>(s) {
                    return Some(parsed.iter().map(scalar_text).collect());
                }
                // Go-style rendering of a list: [a b c]
                let inner = &s[1..s.len() - 1];
                return Some(inner.split_whitespace().map(str::to_string).collect());
            }
            Some(vec![s.to_string()])
        }
        other => Some(vec![scalar_text(other)]),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
