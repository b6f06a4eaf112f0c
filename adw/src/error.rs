//! Typed failures that callers branch on.
//!
//! Everything else travels as `anyhow::Error` with context.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The workflow descriptor cannot be turned into a runnable configuration.
///
/// Raised before any iteration starts; no model has been called when this is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("workflow descriptor not found: {}", .0.display())]
    DescriptorNotFound(PathBuf),
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("prompt file not found: {}", .0.display())]
    PromptNotFound(PathBuf),
    #[error("{category} file not found: {}", path.display())]
    MissingContextFile {
        category: &'static str,
        path: PathBuf,
    },
    #[error("invalid workflow: {0}")]
    Invalid(String),
}

/// The coder capability failed; the director treats this as fatal by default.
#[derive(Debug, Error)]
pub enum CoderInvocationError {
    #[error("spawn coder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("coder timed out after {0:?}")]
    Timeout(Duration),
    #[error("coder exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// A judgment call produced no usable text.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("no provider registered for model id '{0}'")]
    Unroutable(String),
    #[error("{provider} judge timed out after {timeout:?}")]
    Timeout {
        provider: &'static str,
        timeout: Duration,
    },
    #[error("{provider} judge exited with status {code:?}: {stderr}")]
    Failed {
        provider: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}
