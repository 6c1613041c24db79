use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the external tool's `output -json` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputMeta {
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub value_type: Value,
    #[serde(default)]
    pub value: Value,
}

impl OutputMeta {
    /// String projection of the raw value: a JSON string unwraps to the bare
    /// string, anything else renders as compact JSON.
    pub fn as_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> OutputMeta {
        OutputMeta { sensitive: false, value_type: Value::Null, value }
    }

    #[test]
    fn string_value_unwraps() {
        assert_eq!(meta(json!("postgres://db")).as_string(), "postgres://db");
    }

    #[test]
    fn array_value_renders_compact_json() {
        assert_eq!(meta(json!(["a", "b"])).as_string(), r#"["a","b"]"#);
    }

    #[test]
    fn object_value_renders_compact_json() {
        assert_eq!(meta(json!({"k": 1})).as_string(), r#"{"k":1}"#);
    }

    #[test]
    fn number_value_renders_plain() {
        assert_eq!(meta(json!(42)).as_string(), "42");
    }

    #[test]
    fn decodes_tool_payload() {
        let raw = r#"{"sensitive": true, "type": "string", "value": "s3cret"}"#;
        let parsed: OutputMeta = serde_json::from_str(raw).unwrap();
        assert!(parsed.sensitive);
        assert_eq!(parsed.as_string(), "s3cret");
    }
}
