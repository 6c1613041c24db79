use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the external tool keeps state for a component.
///
/// The config map is templated before it is serialized to `backend.tf.json`,
/// so values may contain `{{ … }}` directives until resolution runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Backend {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}
