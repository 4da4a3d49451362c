// ABOUTME: Library root for oplog-replicator
// ABOUTME: Exposes configuration, connections and the oplog replay pipeline

pub mod config;
pub mod connection;
pub mod error;
pub mod oplog;
pub mod utils;

pub use config::{ConnectionConfig, Credentials, OplogNamespace, PipelineConfig, ReplayConfig};
pub use error::{ReplayError, Result, ServerRole};
pub use oplog::{ReplayDaemon, ReplayStats};
