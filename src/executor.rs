//! Driver for the external provisioning tool (OpenTofu or Terraform).

use std::path::PathBuf;
use std::process::Command;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;
use crate::generate;
use crate::model::{Component, OutputMeta};

pub const CMD_TOFU: &str = "tofu";
pub const CMD_TERRAFORM: &str = "terraform";

/// Abstraction over the external provisioning binary.
pub trait Executor {
    fn init(&self, component: &Component) -> Result<(), AppError>;
    /// Returns whether the plan contains changes.
    fn plan(&self, component: &Component) -> Result<bool, AppError>;
    fn apply(&self, component: &Component) -> Result<(), AppError>;
    fn destroy(&self, component: &Component) -> Result<(), AppError>;
    fn output(&self, component: &Component) -> Result<IndexMap<String, OutputMeta>, AppError>;
}

/// Pick the executor matching `tf_command`.
pub fn get_executor(config: &Config) -> Result<Box<dyn Executor>, AppError> {
    match config.tf_command.as_str() {
        CMD_TOFU | CMD_TERRAFORM => Ok(Box::new(TfExecutor::new(config)?)),
        other => Err(AppError::ExecutorNotFound(other.to_string())),
    }
}

pub struct TfExecutor {
    binary: PathBuf,
    command: String,
    generate_backend: bool,
}

impl TfExecutor {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let binary = which::which(&config.tf_command)
            .map_err(|_| AppError::CommandNotFound(config.tf_command.clone()))?;

        // suppress the tool's interactive hints for every later invocation
        std::env::set_var("TF_IN_AUTOMATION", "true");

        Ok(TfExecutor {
            binary,
            command: config.tf_command.clone(),
            generate_backend: config.generate_backend,
        })
    }

    /// Materialise vars, backend and providers files; returns the vars file name.
    fn prepare(&self, component: &Component) -> Result<String, AppError> {
        generate::write_provision_files(component, self.generate_backend)
    }

    fn run(&self, component: &Component, args: &[&str]) -> Result<std::process::ExitStatus, AppError> {
        debug!(component = %component.name, ?args, "invoking {}", self.command);
        let status = Command::new(&self.binary)
            .args(args)
            .current_dir(&component.path)
            .status()?;
        Ok(status)
    }

    fn run_checked(&self, component: &Component, args: &[&str]) -> Result<(), AppError> {
        let status = self.run(component, args)?;
        if !status.success() {
            return Err(AppError::ExternalTool {
                tool: self.command.clone(),
                message: format!("{} exited with {status}", args.first().unwrap_or(&"")),
            });
        }
        Ok(())
    }

    fn init_reconfigure(&self, component: &Component) -> Result<(), AppError> {
        self.run_checked(component, &["init", "-reconfigure", "-input=false"])
    }
}

impl Executor for TfExecutor {
    fn init(&self, component: &Component) -> Result<(), AppError> {
        self.prepare(component)?;
        self.init_reconfigure(component)
    }

    fn plan(&self, component: &Component) -> Result<bool, AppError> {
        let vars_file = self.prepare(component)?;
        self.init_reconfigure(component)?;

        let var_arg = format!("-var-file={vars_file}");
        let out_arg = format!("-out={}", generate::plan_file_name(component));
        let status =
            self.run(component, &["plan", &var_arg, &out_arg, "-input=false", "-detailed-exitcode"])?;

        // -detailed-exitcode: 0 = no changes, 2 = changes present
        match status.code() {
            Some(0) => Ok(false),
            Some(2) => Ok(true),
            _ => Err(AppError::ExternalTool {
                tool: self.command.clone(),
                message: format!("plan exited with {status}"),
            }),
        }
    }

    fn apply(&self, component: &Component) -> Result<(), AppError> {
        let vars_file = self.prepare(component)?;
        self.init_reconfigure(component)?;

        let var_arg = format!("-var-file={vars_file}");
        self.run_checked(component, &["apply", &var_arg, "-input=false", "-auto-approve"])
    }

    fn destroy(&self, component: &Component) -> Result<(), AppError> {
        let vars_file = self.prepare(component)?;
        self.init_reconfigure(component)?;

        let var_arg = format!("-var-file={vars_file}");
        self.run_checked(component, &["destroy", &var_arg, "-input=false", "-auto-approve"])
    }

    fn output(&self, component: &Component) -> Result<IndexMap<String, OutputMeta>, AppError> {
        debug!(component = %component.name, "reading outputs");
        let output = Command::new(&self.binary)
            .args(["output", "-json"])
            .current_dir(&component.path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ExternalTool {
                tool: self.command.clone(),
                message: format!("output failed: {}", stderr.trim()),
            });
        }

        let outputs: IndexMap<String, OutputMeta> = serde_json::from_slice(&output.stdout)?;
        if outputs.is_empty() {
            return Err(AppError::EmptyState(component.name.clone()));
        }

        Ok(outputs)
    }
}
