//! Process-wide configuration: `comet.yaml`, `.env` files and environment
//! overrides, merged once at startup.

use std::env;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::model::BootstrapStep;
use crate::secrets;

pub const CONFIG_FILE: &str = "comet.yaml";

const DEFAULT_ENV_FILE: &str = ".env";
const USER_ENV_FILE: &str = ".env.local";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub tf_command: String,
    pub stacks_dir: String,
    pub work_dir: String,
    pub generate_backend: bool,
    /// Environment variables applied at startup unless the shell already set
    /// them; values may be secret references.
    pub env: IndexMap<String, String>,
    pub bootstrap: Vec<BootstrapStep>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "INFO".to_string(),
            tf_command: "tofu".to_string(),
            stacks_dir: "stacks".to_string(),
            work_dir: "stacks/_components".to_string(),
            generate_backend: true,
            env: IndexMap::new(),
            bootstrap: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration: `.env` then `.env.local`, the YAML config file if
    /// present, then environment overrides on top.
    pub fn load(path: &str) -> Result<Config, AppError> {
        dotenvy::from_filename(DEFAULT_ENV_FILE).ok();
        dotenvy::from_filename_override(USER_ENV_FILE).ok();

        let mut config = if Path::new(path).exists() {
            serde_yaml::from_str(&fs::read_to_string(path)?)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = env::var("TF_COMMAND") {
            self.tf_command = v;
        }
        if let Ok(v) = env::var("STACKS_DIR") {
            self.stacks_dir = v;
        }
        if let Ok(v) = env::var("WORK_DIR") {
            self.work_dir = v;
        }
        if let Ok(v) = env::var("GENERATE_BACKEND") {
            if let Ok(flag) = v.parse::<bool>() {
                self.generate_backend = flag;
            }
        }
    }

    /// Apply the `env:` mapping. Entries already set by the shell win; values
    /// carrying a secret scheme are resolved before being exported.
    pub fn export_env(&self) {
        for (key, value) in &self.env {
            if env::var_os(key).is_some() {
                continue;
            }

            if value.starts_with(secrets::SOPS_PREFIX) || value.starts_with(secrets::OP_PREFIX) {
                match secrets::get(value) {
                    Ok(resolved) => env::set_var(key, resolved),
                    Err(err) => warn!(key = %key, %err, "failed to resolve env secret"),
                }
            } else {
                env::set_var(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.tf_command, "tofu");
        assert_eq!(config.stacks_dir, "stacks");
        assert_eq!(config.work_dir, "stacks/_components");
        assert!(config.generate_backend);
        assert!(config.bootstrap.is_empty());
    }

    #[test]
    #[serial]
    fn yaml_values_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("comet.yaml");
        fs::write(
            &path,
            "tf_command: terraform\nstacks_dir: infra\nwork_dir: \"\"\ngenerate_backend: false\n",
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.tf_command, "terraform");
        assert_eq!(config.stacks_dir, "infra");
        assert_eq!(config.work_dir, "");
        assert!(!config.generate_backend);
        // untouched keys keep their defaults
        assert_eq!(config.log_level, "INFO");
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("comet.yaml");
        fs::write(&path, "tf_command: terraform\n").unwrap();

        env::set_var("TF_COMMAND", "tofu");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        env::remove_var("TF_COMMAND");

        assert_eq!(config.tf_command, "tofu");
    }

    #[test]
    #[serial]
    fn export_env_respects_shell_values() {
        env::set_var("COMET_TEST_PRESET", "from-shell");
        env::remove_var("COMET_TEST_FRESH");

        let mut config = Config::default();
        config.env.insert("COMET_TEST_PRESET".to_string(), "from-config".to_string());
        config.env.insert("COMET_TEST_FRESH".to_string(), "from-config".to_string());
        config.export_env();

        assert_eq!(env::var("COMET_TEST_PRESET").unwrap(), "from-shell");
        assert_eq!(env::var("COMET_TEST_FRESH").unwrap(), "from-config");

        env::remove_var("COMET_TEST_PRESET");
        env::remove_var("COMET_TEST_FRESH");
    }
}
