//! SOPS-encrypted file resolution via the `sops` binary.

use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tracing::debug;

use crate::error::AppError;

use super::SOPS_PREFIX;

const YAML_EXTS: [&str; 2] = ["yaml", "yml"];

/// Decrypt `sops://<file>[#/json/pointer]` and extract the referenced leaf.
pub fn resolve(reference: &str) -> Result<String, AppError> {
    let rest = reference
        .strip_prefix(SOPS_PREFIX)
        .ok_or_else(|| AppError::Secret(format!("invalid reference, must start with '{SOPS_PREFIX}'")))?;

    let (file, fragment) = match rest.split_once('#') {
        Some((file, fragment)) => (file, fragment),
        None => (rest, ""),
    };

    debug!(file, fragment, "decrypting sops reference");
    let decrypted = decrypt_file(file)?;

    let is_yaml = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| YAML_EXTS.contains(&ext));

    let document: Value = if is_yaml {
        serde_yaml::from_str(&decrypted)?
    } else {
        serde_json::from_str(&decrypted)?
    };

    let fragment = fragment.strip_prefix('/').unwrap_or(fragment);
    if fragment.is_empty() {
        return Ok(leaf_text(&document));
    }

    let pointer = format!("/{fragment}");
    match document.pointer(&pointer) {
        Some(leaf) => Ok(leaf_text(leaf)),
        None => Ok(String::new()),
    }
}

fn decrypt_file(file: &str) -> Result<String, AppError> {
    let sops = which::which("sops").map_err(|_| AppError::CommandNotFound("sops".to_string()))?;

    let output = Command::new(sops).arg("--decrypt").arg(file).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no age identity")
            || stderr.contains("0 successful groups required")
            || stderr.contains("failed to get the data key")
        {
            return Err(AppError::Secret(format!(
                "failed to decrypt SOPS file {file}: {}\n\nhint: age key might be missing, run `comet bootstrap` or set SOPS_AGE_KEY",
                stderr.trim()
            )));
        }
        return Err(AppError::Secret(format!(
            "failed to decrypt SOPS file {file}: {}",
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn leaf_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leaf_text_unwraps_strings() {
        assert_eq!(leaf_text(&json!("plain")), "plain");
        assert_eq!(leaf_text(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(leaf_text(&Value::Null), "");
    }

    #[test]
    fn bare_scheme_is_invalid() {
        let err = resolve("oops://x").unwrap_err();
        assert!(matches!(err, AppError::Secret(_)));
    }
}
