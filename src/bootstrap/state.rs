//! Persisted bootstrap state under `.comet/bootstrap.state`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const STATE_DIR: &str = ".comet";
pub const STATE_FILE: &str = "bootstrap.state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: IndexMap<String, StepState>,
}

impl Default for State {
    fn default() -> Self {
        State { version: "1".to_string(), last_run: None, steps: IndexMap::new() }
    }
}

impl State {
    /// Load state rooted at `root`; a missing file is an empty state.
    pub fn load_in(root: &Path) -> Result<State, AppError> {
        let path = state_path(root);
        if !path.exists() {
            return Ok(State::default());
        }

        let content = fs::read_to_string(&path)?;
        let state: State = serde_json::from_str(&content)
            .map_err(|e| AppError::config(format!("invalid bootstrap state file: {e}")))?;
        Ok(state)
    }

    pub fn save_in(&mut self, root: &Path) -> Result<(), AppError> {
        let path = state_path(root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        self.last_run = Some(Utc::now());
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn update_step(&mut self, name: &str, step: StepState) {
        self.steps.insert(name.to_string(), step);
    }

    pub fn get_step(&self, name: &str) -> Option<&StepState> {
        self.steps.get(name)
    }
}

pub fn clear_in(root: &Path) -> Result<(), AppError> {
    let path = state_path(root);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(STATE_FILE)
}
