// ABOUTME: ReplayDaemon wires connections, the tailing cursor and the pipeline together
// ABOUTME: Covers the initialization phase; the event loop itself lives in pipeline.rs

use tokio_util::sync::CancellationToken;

use super::pipeline::{ReplayPipeline, ReplayStats};
use super::reader::TailingCursorBuilder;
use super::writer::MongoApplier;
use crate::config::ReplayConfig;
use crate::connection;
use crate::error::{Result, ServerRole};

/// Runs one oplog replay session from a validated [`ReplayConfig`].
///
/// A session:
/// 1. Validates the configuration without touching the network
/// 2. Connects to the destination, then the source
/// 3. Opens a tailing cursor from the look-back threshold
/// 4. Streams and applies batches until cancelled, exhausted or failed
///
/// Clients and the cursor are released when `run` returns, on every path.
pub struct ReplayDaemon {
    config: ReplayConfig,
}

impl ReplayDaemon {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    fn cursor_builder(&self) -> TailingCursorBuilder {
        TailingCursorBuilder::new(
            self.config.oplog_ns.clone(),
            self.config.lookback,
            self.config.pipeline.idle_wait,
        )
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<ReplayStats> {
        self.config.validate()?;

        tracing::info!(
            "Starting oplog replay from `{}` to `{}`",
            self.config.source.redacted_uri(),
            self.config.destination.redacted_uri()
        );
        tracing::debug!(
            "oplog namespace `{}`, look-back {:?}, batch size {}, flush interval {:?}, idle wait {:?}",
            self.config.oplog_ns,
            self.config.lookback,
            self.config.pipeline.max_batch_size,
            self.config.pipeline.flush_interval,
            self.config.pipeline.idle_wait
        );

        let destination =
            connection::connect(&self.config.destination, ServerRole::Destination).await?;
        let source = connection::connect(&self.config.source, ServerRole::Source).await?;

        let cursor = self.cursor_builder().open(&source).await?;

        let mut pipeline =
            ReplayPipeline::new(self.config.pipeline.clone(), MongoApplier::new(&destination));
        let stats = pipeline.run(cursor, shutdown).await?;

        tracing::info!(
            "Oplog replay stopped: {} batches, {} entries applied, {} no-ops skipped",
            stats.batches_applied,
            stats.entries_applied,
            stats.noops_skipped
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, OplogNamespace, PipelineConfig};
    use std::time::Duration;

    fn config(source: &str, destination: &str) -> ReplayConfig {
        ReplayConfig {
            source: ConnectionConfig::new(source),
            destination: ConnectionConfig::new(destination),
            oplog_ns: OplogNamespace::parse("local.oplog.rs").unwrap(),
            lookback: Duration::from_secs(60),
            pipeline: PipelineConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_same_server_rejected_before_connecting() {
        let daemon = ReplayDaemon::new(config("mongodb://db1:27017/", "mongodb://db1:27017/"));
        let err = daemon.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_invalid_pipeline_rejected_before_connecting() {
        let mut config = config("mongodb://src:27017/", "mongodb://dst:27017/");
        config.pipeline.max_batch_size = 0;
        let err = ReplayDaemon::new(config)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_cursor_builder_uses_config() {
        let daemon = ReplayDaemon::new(config("mongodb://src:27017/", "mongodb://dst:27017/"));
        let builder = daemon.cursor_builder();
        assert_eq!(builder.namespace().to_string(), "local.oplog.rs");
        assert_eq!(builder.threshold_at(1_000).time, 940);
    }
}
