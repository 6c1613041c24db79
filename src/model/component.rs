use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::AppError;

use super::Backend;

/// One provisioning unit: a source directory, a variables map and a backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    /// Name of the owning stack.
    #[serde(default)]
    pub stack: String,
    /// Backend captured from the stack at registration time; templating
    /// mutates this copy, never the stack's.
    #[serde(default)]
    pub backend: Backend,
    /// Lines appended verbatim to generated files, shared across the stack.
    #[serde(default)]
    pub appends: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub name: String,
    /// Source directory; rebound to the work dir copy by `ensure_path`.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub providers: Map<String, Value>,
    /// Upstream components whose state was unavailable during resolution,
    /// keyed component name → stack name.
    #[serde(skip)]
    pub provider_dependencies: IndexMap<String, String>,
}

impl Component {
    /// Template string referencing a not-yet-known property of this component.
    pub fn property_ref(&self, property: &str) -> String {
        format!(r#"{{{{ (state "{}" "{}").{} }}}}"#, self.stack, self.name, property)
    }

    /// Rebind the component into the work dir, copying the source directory
    /// when `copy` is set. Referenced components consulted for `state` lookups
    /// rebind without copying.
    pub fn ensure_path(&mut self, config: &Config, copy: bool) -> Result<(), AppError> {
        if config.work_dir.is_empty() {
            return Ok(());
        }

        let dest = Path::new(&config.work_dir).join(&self.stack).join(&self.name);
        if copy {
            copy_dir(Path::new(&self.path), &dest)?;
        }
        self.path = dest.to_string_lossy().into_owned();
        Ok(())
    }
}

fn copy_dir(src: &Path, dest: &Path) -> Result<(), AppError> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| AppError::config(format!("cannot copy {}: {e}", src.display())))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| AppError::config(format!("cannot copy {}: {e}", src.display())))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_ref_has_state_template_form() {
        let component = Component {
            stack: "dev".to_string(),
            name: "db".to_string(),
            ..Default::default()
        };
        assert_eq!(component.property_ref("url"), r#"{{ (state "dev" "db").url }}"#);
    }

    #[test]
    fn ensure_path_without_work_dir_keeps_source() {
        let config = Config { work_dir: String::new(), ..Default::default() };
        let mut component = Component { path: "modules/db".to_string(), ..Default::default() };
        component.ensure_path(&config, true).unwrap();
        assert_eq!(component.path, "modules/db");
    }

    #[test]
    fn ensure_path_copies_into_work_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("main.tf"), "# main").unwrap();
        fs::write(src.join("nested/vars.tf"), "# vars").unwrap();

        let work_dir = tmp.path().join("work");
        let config = Config {
            work_dir: work_dir.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let mut component = Component {
            stack: "dev".to_string(),
            name: "db".to_string(),
            path: src.to_string_lossy().into_owned(),
            ..Default::default()
        };
        component.ensure_path(&config, true).unwrap();

        let dest = work_dir.join("dev").join("db");
        assert_eq!(component.path, dest.to_string_lossy());
        assert!(dest.join("main.tf").exists());
        assert!(dest.join("nested/vars.tf").exists());
    }

    #[test]
    fn ensure_path_rebind_only_does_not_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.tf"), "# main").unwrap();

        let work_dir = tmp.path().join("work");
        let config = Config {
            work_dir: work_dir.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let mut component = Component {
            stack: "dev".to_string(),
            name: "db".to_string(),
            path: src.to_string_lossy().into_owned(),
            ..Default::default()
        };
        component.ensure_path(&config, false).unwrap();

        assert_eq!(component.path, work_dir.join("dev").join("db").to_string_lossy());
        assert!(!work_dir.join("dev").join("db").join("main.tf").exists());
    }
}
