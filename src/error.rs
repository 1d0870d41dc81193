// Error taxonomy shared by adapters, classifier and plan executor
use std::path::PathBuf;

/// Failure talking to one of the wrapped backends.
///
/// Always caught at the step/probe boundary and turned into a result entry;
/// the public operations of the crate never return it directly.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Errors worth a bounded retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Timeout(_) | AdapterError::Transport(_))
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            AdapterError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            AdapterError::InvalidResponse(err.to_string())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::InvalidResponse(err.to_string())
    }
}

/// The health classifier could not evaluate its input.
///
/// Distinct from a critical verdict: it says nothing about the subsystem, only
/// that the summary or the thresholds were unusable.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ClassificationError {
    #[error("inconsistent {role} counts: {online} online of {total}")]
    InconsistentCounts { role: String, online: u32, total: u32 },

    #[error("invalid metric {name}: {value}")]
    InvalidMetric { name: String, value: f64 },

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
}

/// A provisioning plan that cannot be executed as declared.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("step {step} depends on {dependency}, which is not declared before it")]
    UnknownDependency { step: String, dependency: String },
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration validation failed: {}", .0.join(", "))]
    Invalid(Vec<String>),
}
