use std::io;

use thiserror::Error;

/// Library-wide error type for comet operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Configuration or environment issue.
    #[error("{0}")]
    Config(String),

    /// Required binary is not on PATH.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// No executor matches the configured command.
    #[error("executor not found for command: {0}")]
    ExecutorNotFound(String),

    /// A second stack with the same name was discovered.
    #[error("stack already exists: {0}")]
    StackExists(String),

    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("component not found: {component} in stack: {stack}")]
    ComponentNotFound { component: String, stack: String },

    #[error("no components found in stack: {0}")]
    NoComponents(String),

    /// No script host handles this file extension.
    #[error("unsupported extension: '{0}', no loader found")]
    UnsupportedExtension(String),

    /// Script bundling or evaluation failed.
    #[error("error evaluating {path}: {message}")]
    Script { path: String, message: String },

    #[error("template error: {0}")]
    Template(String),

    /// Secret reference carries a scheme nothing resolves.
    #[error("unsupported prefix: '{0}', no handler found")]
    NoSecretHandler(String),

    /// Secret resolution failed.
    #[error("{0}")]
    Secret(String),

    /// The external tool exited non-zero; its own output was already streamed.
    #[error("'{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// `output` was requested for a component that has no state yet.
    #[error("empty state for: {0} (hint: provision it first with `comet apply`)")]
    EmptyState(String),

    #[error("output key '{key}' not found in component '{component}'")]
    OutputKeyNotFound { key: String, component: String },

    #[error("bootstrap step '{step}' failed: {message}")]
    Bootstrap { step: String, message: String },

    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AppError {
    pub(crate) fn config<S: Into<String>>(message: S) -> Self {
        AppError::Config(message.into())
    }

    pub(crate) fn template<S: Into<String>>(message: S) -> Self {
        AppError::Template(message.into())
    }
}
