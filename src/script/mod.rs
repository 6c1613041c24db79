//! Script hosts: evaluate one stack script into a `Stack`.

mod bundle;
mod js;

pub use js::JsHost;

use std::path::Path;

use crate::error::AppError;
use crate::model::Stack;

/// Extensions the registry dispatches on.
pub const SCRIPT_EXTENSIONS: [&str; 2] = ["js", "ts"];

/// Embedded TypeScript declarations written next to user scripts for editor
/// support; absence never affects evaluation.
pub const TYPE_DEFINITIONS: &str = include_str!("../assets/index.d.ts");

/// A script host turns one stack script into a `Stack`.
pub trait ScriptHost {
    fn parse(&self, path: &Path) -> Result<Stack, AppError>;
}

/// Pick a host by file extension; only one exists today.
pub fn host_for(path: &Path) -> Result<Box<dyn ScriptHost>, AppError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if SCRIPT_EXTENSIONS.contains(&ext) {
        return Ok(Box::new(JsHost::new()));
    }
    Err(AppError::UnsupportedExtension(format!(".{ext}")))
}
