//! Pipeline error types

use thiserror::Error;

/// What the pipeline does when a module fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Stop the chain and reject the request
    Abort,
    /// Log the failure and run the next module
    Continue,
}

/// A failure raised by a module while processing a request
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ModuleError {
    pub action: ErrorAction,
    pub message: String,
}

impl ModuleError {
    pub fn abort(message: impl Into<String>) -> Self {
        ModuleError {
            action: ErrorAction::Abort,
            message: message.into(),
        }
    }

    pub fn continue_with(message: impl Into<String>) -> Self {
        ModuleError {
            action: ErrorAction::Continue,
            message: message.into(),
        }
    }
}

/// Errors raised while building a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error("Invalid config for module '{module}': {reason}")]
    InvalidConfig { module: String, reason: String },
}

impl PipelineError {
    pub fn invalid_config(module: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::InvalidConfig {
            module: module.into(),
            reason: reason.to_string(),
        }
    }
}
