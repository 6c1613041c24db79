//! 1Password resolution via the `op` CLI. The binary is located once per
//! process; `OP_SERVICE_ACCOUNT_TOKEN` passes through the environment.

use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::AppError;

use super::OP_PREFIX;

static OP_BINARY: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Resolve an `op://vault/item/field` reference.
pub fn resolve(reference: &str) -> Result<String, AppError> {
    if !reference.starts_with(OP_PREFIX) {
        return Err(AppError::Secret(format!("invalid reference, must start with '{OP_PREFIX}'")));
    }

    let binary = OP_BINARY
        .get_or_init(|| which::which("op").ok())
        .as_ref()
        .ok_or_else(|| AppError::CommandNotFound("op".to_string()))?;

    debug!(reference = %reference, "resolving 1password reference");
    let output = Command::new(binary).args(["read", reference]).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::Secret(format!(
            "failed to resolve {reference}: {}",
            stderr.trim()
        )));
    }

    let value = String::from_utf8_lossy(&output.stdout);
    Ok(value.trim_end_matches('\n').to_string())
}
