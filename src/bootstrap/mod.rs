//! One-time bootstrap: fetch secrets, run setup commands, verify tooling.
//! Step status persists under `.comet/bootstrap.state` so re-runs are cheap.

mod runner;
mod state;

pub use runner::{expand_path, resolve_sops_age_path, Runner};
pub use state::{clear_in, State, StepState, StepStatus, STATE_DIR, STATE_FILE};

use std::path::Path;

use comfy_table::Table;

use crate::config::Config;
use crate::error::AppError;

pub fn run(config: &Config, force: bool) -> Result<(), AppError> {
    Runner::new(config, force)?.run()
}

/// Print the persisted status of every known step.
pub fn status(config: &Config) -> Result<(), AppError> {
    let state = State::load_in(Path::new("."))?;

    if state.steps.is_empty() {
        println!("No bootstrap state found");
        if !config.bootstrap.is_empty() {
            println!("{} step(s) configured, run `comet bootstrap`", config.bootstrap.len());
        }
        return Ok(());
    }

    if let Some(last_run) = state.last_run {
        println!("Last run: {last_run}");
    }

    let mut table = Table::new();
    table.set_header(vec!["step", "status", "completed", "target", "error"]);
    for (name, step) in &state.steps {
        let status = match step.status {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        let completed =
            step.completed_at.map(|t| t.to_string()).unwrap_or_default();
        table.add_row(vec![
            name.clone(),
            status.to_string(),
            completed,
            step.target.clone(),
            step.error.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn clear() -> Result<(), AppError> {
    clear_in(Path::new("."))
}
