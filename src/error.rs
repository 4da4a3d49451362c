// ABOUTME: Error taxonomy for oplog replay
// ABOUTME: Separates configuration, connection, stream and apply failures

use std::fmt;
use thiserror::Error;

/// Result type alias for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Which server a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Source,
    Destination,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerRole::Source => write!(f, "source"),
            ServerRole::Destination => write!(f, "destination"),
        }
    }
}

/// Errors that can terminate an oplog replay run.
///
/// | Variant | Raised | Effect |
/// |---------|--------|--------|
/// | `Config` | before any connection | run never starts |
/// | `Connection` | during initialization | run never starts |
/// | `Stream` | by the producer | buffered entries are drained, then returned |
/// | `Apply` | transport failure during `applyOps` | fatal, returned immediately |
/// | `Rejected` | destination answered `ok: 0` | fatal, returned immediately |
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Invalid namespace, host string or option combination.
    #[error("configuration error: {0}")]
    Config(String),

    /// Could not obtain a client for one of the servers.
    #[error("error connecting to {role} db: {message}")]
    Connection { role: ServerRole, message: String },

    /// Reading the tailing cursor failed or returned a malformed entry.
    #[error("error querying oplog: {0}")]
    Stream(String),

    /// The `applyOps` command could not be executed.
    #[error("error applying ops: {0}")]
    Apply(String),

    /// The destination executed `applyOps` and reported failure.
    #[error("server gave error applying ops: {0}")]
    Rejected(String),
}

impl ReplayError {
    pub fn config(message: impl Into<String>) -> Self {
        ReplayError::Config(message.into())
    }

    pub fn connection(role: ServerRole, err: impl fmt::Display) -> Self {
        ReplayError::Connection {
            role,
            message: err.to_string(),
        }
    }

    /// Whether the error was raised before any connection was opened.
    pub fn is_config(&self) -> bool {
        matches!(self, ReplayError::Config(_))
    }

    /// Whether the error came from the destination side of the pipeline.
    pub fn is_apply_failure(&self) -> bool {
        matches!(self, ReplayError::Apply(_) | ReplayError::Rejected(_))
    }
}
