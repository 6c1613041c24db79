//! Bootstrap step execution: idempotent, state-tracked provisioning of local
//! prerequisites (secrets on disk, setup commands, binary checks).

use std::fs;
use std::io::Write as _;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;

use age::x25519::Identity;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::model::{BootstrapStep, StepType};
use crate::secrets;

use super::state::{State, StepState, StepStatus};

const SOPS_AGE_KEY_SUFFIX: &str = "sops/age/keys.txt";
const DEFAULT_SECRET_MODE: u32 = 0o600;

pub struct Runner<'a> {
    config: &'a Config,
    state: State,
    force: bool,
    root: PathBuf,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config, force: bool) -> Result<Self, AppError> {
        Self::with_root(config, force, ".")
    }

    pub fn with_root(
        config: &'a Config,
        force: bool,
        root: impl Into<PathBuf>,
    ) -> Result<Self, AppError> {
        let root = root.into();
        let state = State::load_in(&root)?;
        Ok(Runner { config, state, force, root })
    }

    /// Run all configured steps; optional steps may fail without aborting.
    /// The state file is persisted once afterwards.
    pub fn run(&mut self) -> Result<(), AppError> {
        if self.config.bootstrap.is_empty() {
            info!("no bootstrap steps configured");
            return Ok(());
        }

        info!("running {} bootstrap step(s)", self.config.bootstrap.len());

        let steps = self.config.bootstrap.clone();
        let mut failure = None;
        for step in &steps {
            match self.run_step(step) {
                Ok(()) => {}
                Err(err) if step.optional => {
                    warn!(step = %step.name, %err, "optional step failed");
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        self.state.save_in(&self.root)?;
        match failure {
            Some(err) => Err(err),
            None => {
                info!("bootstrap complete");
                Ok(())
            }
        }
    }

    fn run_step(&mut self, step: &BootstrapStep) -> Result<(), AppError> {
        if !self.should_run(step) {
            info!(step = %step.name, "already completed, skipping");
            return Ok(());
        }

        info!(step = %step.name, "running bootstrap step");
        let result = match step.step_type {
            StepType::Secret => self.run_secret_step(step),
            StepType::Command => run_command_step(step),
            StepType::Check => run_check_step(step),
        };

        let mut step_state = StepState {
            status: StepStatus::Completed,
            completed_at: None,
            target: step.target.clone(),
            error: None,
            last_attempt: Some(Utc::now()),
        };

        match result {
            Ok(()) => {
                step_state.completed_at = Some(Utc::now());
                self.state.update_step(&step.name, step_state);
                Ok(())
            }
            Err(err) => {
                step_state.status = StepStatus::Failed;
                step_state.error = Some(err.to_string());
                self.state.update_step(&step.name, step_state);
                Err(AppError::Bootstrap { step: step.name.clone(), message: err.to_string() })
            }
        }
    }

    fn should_run(&self, step: &BootstrapStep) -> bool {
        if self.force {
            return true;
        }

        let completed = self
            .state
            .get_step(&step.name)
            .map(|s| s.status == StepStatus::Completed)
            .unwrap_or(false);
        if !completed {
            return true;
        }

        // a completed secret step must still run if its file went missing
        if step.step_type == StepType::Secret && !step.target.is_empty() {
            let target = expand_path(&step.target);
            if !Path::new(&target).exists() {
                debug!(step = %step.name, path = %target, "target file missing");
                return true;
            }
        }

        if !step.check.is_empty() {
            let passed = Command::new("sh")
                .args(["-c", &step.check])
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !passed {
                debug!(step = %step.name, "check command failed");
                return true;
            }
        }

        false
    }

    fn run_secret_step(&self, step: &BootstrapStep) -> Result<(), AppError> {
        info!(source = %step.source, "fetching secret");
        let value = secrets::get(&step.source)?;

        let target = if step.target.is_empty() {
            if is_sops_age_key_source(&step.source) {
                default_sops_age_path().ok_or_else(|| {
                    AppError::config(format!(
                        "cannot determine a default target for: {}",
                        step.source
                    ))
                })?
            } else {
                return Err(AppError::config(format!(
                    "target path is required for secret: {}",
                    step.source
                )));
            }
        } else {
            expand_path(&step.target)
        };

        if let Some(parent) = Path::new(&target).parent() {
            fs::create_dir_all(parent)?;
        }

        let mode = parse_mode(&step.mode)?;

        let mut formatted = if is_sops_age_key_source(&step.source) {
            match format_age_key(&value) {
                Ok(formatted) => formatted,
                Err(err) => {
                    warn!(%err, "could not parse age key, saving as-is");
                    value.clone()
                }
            }
        } else {
            value.clone()
        };
        if !formatted.is_empty() && !formatted.ends_with('\n') {
            formatted.push('\n');
        }

        if is_sops_age_key_source(&step.source) {
            if !should_append_age_key(Path::new(&target), &formatted)? {
                info!(path = %target, "key already present");
                return Ok(());
            }
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .mode(mode)
                .open(&target)?;
            file.write_all(formatted.as_bytes())?;
            info!(path = %target, "appended age key");
        } else {
            fs::write(&target, formatted)?;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            info!(path = %target, "saved secret");
        }

        Ok(())
    }
}

fn run_command_step(step: &BootstrapStep) -> Result<(), AppError> {
    info!(command = %step.command, "executing");
    let status = Command::new("sh").args(["-c", &step.command]).status()?;
    if !status.success() {
        return Err(AppError::config(format!("command failed: {status}")));
    }
    Ok(())
}

fn run_check_step(step: &BootstrapStep) -> Result<(), AppError> {
    let missing: Vec<&str> = step
        .command
        .split(',')
        .map(str::trim)
        .filter(|binary| !binary.is_empty() && which::which(binary).is_err())
        .collect();

    if !missing.is_empty() {
        return Err(AppError::config(format!(
            "missing required binaries: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Expand `~`, environment variables and the platform-specific SOPS age key
/// location in a target path.
pub fn expand_path(path: &str) -> String {
    if path.contains(SOPS_AGE_KEY_SUFFIX) {
        if let Some(resolved) = resolve_sops_age_path(path) {
            return resolved;
        }
    }

    let expanded = match path.strip_prefix("~/") {
        Some(rest) => match home_dir() {
            Some(home) => home.join(rest).to_string_lossy().into_owned(),
            None => path.to_string(),
        },
        None => path.to_string(),
    };

    expand_env_vars(&expanded)
}

/// SOPS reads age keys from `$XDG_CONFIG_HOME/sops/age/keys.txt`, falling
/// back to the platform config dir. Paths not carrying the suffix are left
/// to the ordinary expansion rules.
pub fn resolve_sops_age_path(path: &str) -> Option<String> {
    if !path.contains(SOPS_AGE_KEY_SUFFIX) {
        return None;
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join(SOPS_AGE_KEY_SUFFIX).to_string_lossy().into_owned());
        }
    }

    let home = home_dir()?;
    let resolved = if cfg!(target_os = "macos") {
        home.join("Library").join("Application Support").join(SOPS_AGE_KEY_SUFFIX)
    } else {
        home.join(".config").join(SOPS_AGE_KEY_SUFFIX)
    };
    Some(resolved.to_string_lossy().into_owned())
}

fn default_sops_age_path() -> Option<String> {
    resolve_sops_age_path(SOPS_AGE_KEY_SUFFIX)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn expand_env_vars(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(close) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + 2 + close].iter().collect();
                    out.push_str(&std::env::var(&name).unwrap_or_default());
                    i += close + 3;
                    continue;
                }
            } else if chars[i + 1].is_alphanumeric() || chars[i + 1] == '_' {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[i + 1..end].iter().collect();
                out.push_str(&std::env::var(&name).unwrap_or_default());
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

fn parse_mode(mode: &str) -> Result<u32, AppError> {
    if mode.is_empty() {
        return Ok(DEFAULT_SECRET_MODE);
    }
    u32::from_str_radix(mode, 8)
        .map_err(|e| AppError::config(format!("invalid file mode {mode}: {e}")))
}

fn is_sops_age_key_source(source: &str) -> bool {
    let lower = source.to_lowercase();
    lower.contains("sops") && (lower.contains("age") || lower.contains("key"))
}

/// Prefix an age secret key with its public-key comment.
fn format_age_key(secret_key: &str) -> Result<String, AppError> {
    let trimmed = secret_key.trim();
    let identity: Identity = trimmed
        .parse()
        .map_err(|e| AppError::Secret(format!("failed to parse age identity: {e}")))?;
    Ok(format!("# public key: {}\n{trimmed}", identity.to_public()))
}

/// An age key is appended iff its recipient is not already present; missing
/// or empty key files always accept the key.
fn should_append_age_key(path: &Path, formatted: &str) -> Result<bool, AppError> {
    let candidate = extract_secret_key(formatted)
        .ok_or_else(|| AppError::Secret("no age secret key in formatted content".to_string()))?;
    let identity: Identity = candidate
        .parse()
        .map_err(|e| AppError::Secret(format!("failed to parse new key: {e}")))?;
    let new_recipient = identity.to_public().to_string();

    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err.into()),
    };

    for line in existing.lines() {
        let line = line.trim();
        if !line.starts_with("AGE-SECRET-KEY-") {
            continue;
        }
        let Ok(existing_identity) = line.parse::<Identity>() else {
            continue;
        };
        if existing_identity.to_public().to_string() == new_recipient {
            return Ok(false);
        }
    }

    Ok(true)
}

fn extract_secret_key(content: &str) -> Option<&str> {
    content.lines().map(str::trim).find(|line| line.starts_with("AGE-SECRET-KEY-"))
}
