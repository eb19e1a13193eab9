use std::path::PathBuf;

use thiserror::Error;

use crate::platform::Platform;
use crate::results::RunResult;

/// The main error type for ct operations
#[derive(Debug, Error)]
pub enum CtError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("plugin not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The process ran (or tried to) and failed. The record carries the detail.
    #[error("{program} runner failed: {}", .result.error.as_deref().unwrap_or("unknown error"))]
    Execution {
        program: String,
        result: Box<RunResult>,
    },

    #[error("missing dependency: {0}")]
    DependencyRefused(String),

    #[error("no installer defined for {dependency} on {platform}")]
    NoInstaller {
        dependency: String,
        platform: Platform,
    },

    #[error("no supported package manager found on PATH for {0}")]
    NoPackageManager(String),

    #[error("installer failed: {0}")]
    InstallerFailed(String),

    #[error("job queue is not running")]
    QueueNotRunning,

    #[error("job queue was cancelled")]
    Cancelled,

    #[error("unknown task: {0}")]
    UnknownTask(String),
}

impl CtError {
    /// Take the result record out of an execution failure, if there is one.
    pub fn into_run_result(self) -> Option<RunResult> {
        match self {
            CtError::Execution { result, .. } => Some(*result),
            _ => None,
        }
    }

    /// Borrow the result record of an execution failure.
    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            CtError::Execution { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Result type alias for ct operations
pub type CtResult<T> = Result<T, CtError>;
