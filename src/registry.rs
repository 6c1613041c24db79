//! Stack discovery: walk the stacks directory, evaluate every script and
//! collect the valid stacks.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::AppError;
use crate::model::Stacks;
use crate::script;

/// Load every stack under the configured stacks directory. Scripts that do
/// not declare a valid stack are discarded; duplicate stack names abort.
pub fn load_stacks(config: &Config) -> Result<Stacks, AppError> {
    let dir = &config.stacks_dir;
    if !Path::new(dir).is_dir() {
        return Err(AppError::config(format!("stacks directory not found: {dir}")));
    }

    if let Err(err) = ensure_type_defs(dir) {
        warn!(%err, "could not write type definitions");
    }

    // the work dir usually lives inside the stacks dir; its copies must not
    // be picked up as stack scripts
    let work_dir = if config.work_dir.is_empty() {
        None
    } else {
        std::path::absolute(&config.work_dir).ok()
    };

    let mut stacks = Stacks::default();
    let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(move |entry| {
        match &work_dir {
            Some(wd) => std::path::absolute(entry.path()).map(|p| p != *wd).unwrap_or(true),
            None => true,
        }
    });

    for entry in walker {
        let entry =
            entry.map_err(|e| AppError::config(format!("cannot read stacks directory: {e}")))?;
        if !entry.file_type().is_file() || !is_stack_script(entry.path()) {
            continue;
        }

        let host = script::host_for(entry.path())?;
        let stack = host.parse(entry.path())?;
        if stack.valid() {
            stacks.add_stack(stack)?;
        } else {
            debug!(path = %entry.path().display(), "ignoring invalid stack script");
        }
    }

    Ok(stacks)
}

fn is_stack_script(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.ends_with(".d.ts") {
        return false;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    script::SCRIPT_EXTENSIONS.contains(&ext)
}

/// Write `index.d.ts` next to user scripts when missing.
pub fn ensure_type_defs(dir: &str) -> Result<(), AppError> {
    let path = Path::new(dir).join("index.d.ts");
    if !path.exists() {
        fs::write(&path, script::TYPE_DEFINITIONS)?;
        debug!(path = %path.display(), "wrote type definitions");
    }
    Ok(())
}

/// Overwrite `index.d.ts` (the `types` subcommand).
pub fn write_type_defs(dir: &str) -> Result<PathBuf, AppError> {
    let path = Path::new(dir).join("index.d.ts");
    fs::write(&path, script::TYPE_DEFINITIONS)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &Path) -> Config {
        Config {
            stacks_dir: dir.to_string_lossy().into_owned(),
            work_dir: String::new(),
            ..Default::default()
        }
    }

    #[test]
    fn discovers_valid_stacks() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("dev.stack.js"),
            "stack('dev'); component('app', './app', { x: 1 });",
        )
        .unwrap();
        fs::write(
            tmp.path().join("prod.stack.js"),
            "stack('prod'); component('app', './app', {});",
        )
        .unwrap();

        let stacks = load_stacks(&config_for(tmp.path())).unwrap();
        assert!(stacks.get_stack("dev").is_ok());
        assert!(stacks.get_stack("prod").is_ok());
    }

    #[test]
    fn invalid_scripts_are_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("noop.js"), "print('not a stack');").unwrap();

        let stacks = load_stacks(&config_for(tmp.path())).unwrap();
        assert!(stacks.is_empty());
    }

    #[test]
    fn duplicate_stack_names_fail_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.stack.js"), "stack('dev'); component('x', './x', {});")
            .unwrap();
        fs::write(tmp.path().join("b.stack.js"), "stack('dev'); component('y', './y', {});")
            .unwrap();

        let err = load_stacks(&config_for(tmp.path())).unwrap_err();
        assert!(matches!(err, AppError::StackExists(name) if name == "dev"));
    }

    #[test]
    fn declaration_files_are_not_scripts() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("index.d.ts"), "declare function stack(): void;").unwrap();

        let stacks = load_stacks(&config_for(tmp.path())).unwrap();
        assert!(stacks.is_empty());
    }

    #[test]
    fn missing_directory_is_fatal() {
        let config = Config {
            stacks_dir: "does-not-exist".to_string(),
            ..Default::default()
        };
        assert!(load_stacks(&config).is_err());
    }

    #[test]
    fn type_definitions_are_written_once() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        load_stacks(&config).unwrap();

        let defs = tmp.path().join("index.d.ts");
        assert!(defs.exists());
        let content = fs::read_to_string(&defs).unwrap();
        assert!(content.contains("declare function stack"));

        // an existing file is left alone
        fs::write(&defs, "// user edited").unwrap();
        load_stacks(&config).unwrap();
        assert_eq!(fs::read_to_string(&defs).unwrap(), "// user edited");
    }
}
