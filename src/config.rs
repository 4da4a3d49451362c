// ABOUTME: Runtime configuration for an oplog replay run
// ABOUTME: Holds validated connection, namespace and batching settings

use std::fmt;
use std::time::Duration;

use crate::error::{ReplayError, Result};
use crate::utils::{split_namespace, strip_password_from_uri, validate_source_destination_different};

pub const DEFAULT_OPLOG_NS: &str = "local.oplog.rs";
pub const DEFAULT_LOOKBACK_SECS: u64 = 86_400;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_secs(600);

/// Batching and tailing settings for the replay pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Entries buffered before a flush is forced.
    pub max_batch_size: usize,
    /// Period of the timer trigger.
    pub flush_interval: Duration,
    /// How long a single cursor fetch may wait for new entries.
    pub idle_wait: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(ReplayError::config("batch size must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(ReplayError::config("flush interval must be greater than zero"));
        }
        if self.idle_wait.is_zero() {
            return Err(ReplayError::config("idle wait must be greater than zero"));
        }
        Ok(())
    }
}

/// Username/password authentication shared by both servers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub source: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("source", &self.source)
            .finish()
    }
}

/// Where and how to connect to one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub uri: String,
    pub credentials: Option<Credentials>,
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// The URI with any password removed, for logging.
    pub fn redacted_uri(&self) -> String {
        strip_password_from_uri(&self.uri)
    }
}

/// A fully-qualified oplog namespace (`<db>.<collection>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OplogNamespace {
    pub database: String,
    pub collection: String,
}

impl OplogNamespace {
    /// Parse and validate a namespace; a missing collection part is rejected.
    pub fn parse(namespace: &str) -> Result<Self> {
        let (database, collection) = split_namespace(namespace)?;
        let collection = collection
            .ok_or_else(|| ReplayError::config("the oplog namespace must specify a collection"))?;
        Ok(Self {
            database,
            collection,
        })
    }
}

impl fmt::Display for OplogNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Everything a replay run needs.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub source: ConnectionConfig,
    pub destination: ConnectionConfig,
    pub oplog_ns: OplogNamespace,
    /// How far back from now the tailing cursor starts.
    pub lookback: Duration,
    pub pipeline: PipelineConfig,
}

impl ReplayConfig {
    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        validate_source_destination_different(&self.source.uri, &self.destination.uri)
    }
}
