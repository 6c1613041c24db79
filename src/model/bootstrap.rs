use serde::{Deserialize, Serialize};

/// Kind of work a bootstrap step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Fetch a secret and write it to a file.
    Secret,
    /// Run a shell command.
    Command,
    /// Verify a comma-separated list of binaries is on PATH.
    Check,
}

/// A single bootstrap operation from `comet.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapStep {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Where to fetch from (`op://…`, `sops://…`).
    #[serde(default)]
    pub source: String,
    /// Where to save (file path); secret steps with recognised age-key
    /// sources may leave this empty and use the platform default.
    #[serde(default)]
    pub target: String,
    /// Octal file permissions, e.g. "0600".
    #[serde(default)]
    pub mode: String,
    /// Shell command for `command` steps, binary list for `check` steps.
    #[serde(default)]
    pub command: String,
    /// Optional shell snippet; a failing check means the step must run.
    #[serde(default)]
    pub check: String,
    /// Optional steps may fail without aborting the run.
    #[serde(default)]
    pub optional: bool,
}
