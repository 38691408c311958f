//! Common Error Types
//!
//! Error taxonomy for unit loading, space discovery, configuration and
//! function calls.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a single unit
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unit source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read unit source {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unit source {} is too large ({size} bytes, max {max})", .path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("failed to parse unit {unit}: {source}")]
    Parse {
        unit: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unit {0} declares a dependency on itself")]
    SelfDependency(String),

    #[error("unit {unit} requires {dependency}, which is not present in the space")]
    MissingDependency { unit: String, dependency: String },

    #[error("unit {unit} exports unknown builtin function {builtin}")]
    UnknownBuiltin { unit: String, builtin: String },

    #[error("unit {unit} has an invalid export: {reason}")]
    InvalidExport { unit: String, reason: String },

    #[error("failed to open library {}: {source}", .path.display())]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("library {} has no entry point {symbol}", .path.display())]
    MissingEntryPoint { path: PathBuf, symbol: &'static str },
}

impl LoadError {
    /// Whether discovery treats this failure as "no definition at this slot"
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LoadError::NotFound(_) | LoadError::SelfDependency(_))
    }
}

/// Errors raised by space discovery
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("space root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("failed to load slot {slot} from {}: {source}", .path.display())]
    Load {
        slot: String,
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl SpaceError {
    /// The unit load failure that aborted discovery, if any
    pub fn load_error(&self) -> Option<&LoadError> {
        match self {
            SpaceError::Load { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors returned by function definitions at call time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("script exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("{command} timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("script returned invalid JSON: {0}")]
    InvalidOutput(String),

    #[error("definition {0} is not callable")]
    NotCallable(String),

    #[error("no definition named {0}")]
    UnknownDefinition(String),

    #[error("{0}")]
    Other(String),
}

impl From<String> for CallError {
    fn from(message: String) -> Self {
        CallError::Other(message)
    }
}

impl From<&str> for CallError {
    fn from(message: &str) -> Self {
        CallError::Other(message.to_string())
    }
}

/// Discovery result type
pub type SpaceResult<T> = Result<T, SpaceError>;
