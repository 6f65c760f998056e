// logpulse - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation. All errors preserve the causal chain
// for diagnostic logging.
//
// Data-path failures (malformed lines, tailer I/O statuses, bus overflow)
// are counted on the stats buffers and never surface here; these types
// cover startup and lifecycle failures only.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all logpulse operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum AgentError {
    /// Command-line or runtime configuration is invalid.
    Config(ConfigError),

    /// The filesystem watcher could not be started.
    Watch(WatchError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Watch(e) => write!(f, "Watch error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Watch(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors related to command-line and runtime configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A numeric option is outside its allowed range.
    ValueOutOfRange {
        field: &'static str,
        value: String,
        expected: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "option '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Watch errors
// ---------------------------------------------------------------------------

/// Errors related to starting the filesystem watch.
#[derive(Debug)]
pub enum WatchError {
    /// The watch root does not exist.
    RootNotFound { path: PathBuf },

    /// The watch root is not a directory.
    NotADirectory { path: PathBuf },

    /// Permission denied accessing the watch root.
    PermissionDenied { path: PathBuf, source: io::Error },
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "watch path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "watch path '{}' is not a directory", path.display())
            }
            Self::PermissionDenied { path, source } => {
                write!(
                    f,
                    "permission denied accessing '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<WatchError> for AgentError {
    fn from(e: WatchError) -> Self {
        Self::Watch(e)
    }
}

/// Convenience type alias for logpulse results.
pub type Result<T> = std::result::Result<T, AgentError>;
