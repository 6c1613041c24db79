//! Shared testing utilities for comet CLI tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Fake external tool: records every invocation (component dir + verb) and
/// serves canned `output -json` payloads per component.
const TOOL_SHIM: &str = r#"#!/bin/sh
printf '%s %s\n' "$(basename "$PWD")" "$1" >> "$TOFU_LOG"
case "$1" in
  output)
    name=$(basename "$PWD")
    if [ -f "$TOFU_OUTPUTS/$name.json" ]; then
      cat "$TOFU_OUTPUTS/$name.json"
    else
      printf '{}\n'
    fi
    ;;
esac
exit 0
"#;

/// Isolated project directory with a config file, a stacks dir and a PATH
/// shim standing in for the external tool.
#[allow(dead_code)]
pub struct TestContext {
    root: TempDir,
    bin_dir: PathBuf,
    log_file: PathBuf,
    outputs_dir: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp directory");
        let bin_dir = root.path().join("bin");
        let outputs_dir = root.path().join("outputs");
        fs::create_dir_all(&bin_dir).expect("failed to create bin dir");
        fs::create_dir_all(&outputs_dir).expect("failed to create outputs dir");
        fs::create_dir_all(root.path().join("stacks")).expect("failed to create stacks dir");

        let shim = bin_dir.join("tofu");
        fs::write(&shim, TOOL_SHIM).expect("failed to write tool shim");
        let mut perms = fs::metadata(&shim).expect("shim metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&shim, perms).expect("failed to mark shim executable");

        let log_file = root.path().join("tool.log");
        let ctx = Self { root, bin_dir, log_file, outputs_dir };
        ctx.write_config("");
        ctx
    }

    /// (Re)write comet.yaml; `extra` is appended to the base configuration.
    pub fn write_config(&self, extra: &str) {
        let config =
            format!("log_level: INFO\ntf_command: tofu\nstacks_dir: stacks\nwork_dir: \"\"\n{extra}");
        fs::write(self.root.path().join("comet.yaml"), config).expect("failed to write config");
    }

    pub fn write_stack(&self, name: &str, source: &str) {
        fs::write(self.root.path().join("stacks").join(name), source)
            .expect("failed to write stack script");
    }

    /// Create a component source directory under stacks/.
    pub fn write_component_dir(&self, name: &str) {
        let dir = self.root.path().join("stacks").join(name);
        fs::create_dir_all(&dir).expect("failed to create component dir");
        fs::write(dir.join("main.tf"), "# placeholder\n").expect("failed to write main.tf");
    }

    /// Seed the shim's `output -json` payload for one component.
    pub fn seed_outputs(&self, component: &str, json: &str) {
        fs::write(self.outputs_dir.join(format!("{component}.json")), json)
            .expect("failed to seed outputs");
    }

    pub fn cli(&self) -> Command {
        let mut cmd = Command::cargo_bin("comet").expect("comet binary builds");
        cmd.current_dir(self.root.path());
        let path = std::env::var("PATH").unwrap_or_default();
        cmd.env("PATH", format!("{}:{path}", self.bin_dir.display()));
        cmd.env("TOFU_LOG", &self.log_file);
        cmd.env("TOFU_OUTPUTS", &self.outputs_dir);
        cmd
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.root.path().join(relative)).expect("file should exist")
    }

    pub fn file_exists(&self, relative: &str) -> bool {
        self.root.path().join(relative).exists()
    }

    /// Everything the tool shim logged, one "component verb" line per call.
    pub fn tool_log(&self) -> String {
        fs::read_to_string(&self.log_file).unwrap_or_default()
    }
}
