//! Secret resolution: turn a `sops://` or `op://` reference into plaintext.

mod op;
mod sops;

use crate::error::AppError;

pub const SOPS_PREFIX: &str = "sops://";
pub const OP_PREFIX: &str = "op://";

/// Resolve a secret reference to its plaintext value.
pub fn get(reference: &str) -> Result<String, AppError> {
    if reference.starts_with(OP_PREFIX) {
        return op::resolve(reference);
    }

    if reference.starts_with(SOPS_PREFIX) {
        return sops::resolve(reference);
    }

    Err(AppError::NoSecretHandler(reference.to_string()))
}

/// Defaults used to expand the `secret()` script shorthand.
#[derive(Debug, Clone)]
pub struct SecretDefaults {
    pub provider: String,
    pub path: String,
}

impl Default for SecretDefaults {
    fn default() -> Self {
        SecretDefaults { provider: "sops".to_string(), path: "secrets.enc.yaml".to_string() }
    }
}

/// Expand a shorthand secret path into a full reference. Paths that already
/// carry a provider scheme pass through; dots double as path separators.
pub fn expand_shorthand(path: &str, defaults: &SecretDefaults) -> String {
    if path.starts_with(SOPS_PREFIX) || path.starts_with(OP_PREFIX) {
        return path.to_string();
    }

    let path = path.replace('.', "/");
    format!("{}://{}#/{}", defaults.provider, defaults.path, path)
}
