// ABOUTME: Coordinator event loop: accumulates forwarded entries and flushes them in order
// ABOUTME: Owns the state machine, the flush timer and the producer task's lifetime

use std::time::Duration;

use bson::Timestamp;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::batch::{FlushTrigger, OplogBatch};
use super::entry::OplogEntry;
use super::producer::{ProducerReport, StreamEnd, StreamProducer};
use super::reader::TailingCursor;
use super::writer::OplogApplier;
use crate::config::PipelineConfig;
use crate::error::{ReplayError, Result};

/// Hand-off capacity between producer and coordinator. tokio channels
/// cannot be zero-sized; one slot keeps the producer at most one entry ahead.
const HANDOFF_CAPACITY: usize = 1;

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    Streaming,
    /// Stopping: buffered entries get one final flush.
    Draining,
    Stopped,
    Fatal,
}

/// Counters for a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub batches_applied: u64,
    pub entries_applied: u64,
    /// Entries the producer handed over, including any still buffered when a
    /// fatal error hit.
    pub entries_forwarded: u64,
    pub noops_skipped: u64,
    pub last_applied: Option<Timestamp>,
}

/// Runs the accumulate/flush loop against an [`OplogApplier`].
pub struct ReplayPipeline<A: OplogApplier> {
    config: PipelineConfig,
    applier: A,
    batch: OplogBatch,
    state: PipelineState,
    stats: ReplayStats,
}

impl<A: OplogApplier> ReplayPipeline<A> {
    pub fn new(config: PipelineConfig, applier: A) -> Self {
        let batch = OplogBatch::new(config.max_batch_size);
        Self {
            config,
            applier,
            batch,
            state: PipelineState::Initializing,
            stats: ReplayStats::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Tail `cursor` and apply everything it yields until cancelled, until
    /// the producer finishes, or until a fatal error.
    ///
    /// On cancellation or producer completion the buffered entries are
    /// flushed once before returning. A producer that ended on a read error
    /// makes the run return that error after the final flush.
    pub async fn run(
        &mut self,
        cursor: TailingCursor,
        shutdown: CancellationToken,
    ) -> Result<ReplayStats> {
        let (sender, mut receiver) = mpsc::channel(HANDOFF_CAPACITY);
        let producer =
            tokio::spawn(StreamProducer::new(cursor, sender, shutdown.child_token()).run());
        self.transition(PipelineState::Streaming);

        let result = self.stream(&mut receiver, &shutdown).await;
        drop(receiver);

        match result {
            Ok(()) => {
                self.transition(PipelineState::Draining);
                if let Err(e) = self.flush(FlushTrigger::Drain).await {
                    producer.abort();
                    self.transition(PipelineState::Fatal);
                    return Err(e);
                }
                // On cancellation the producer's child token is already
                // cancelled, so the join returns promptly.
                let report = Self::join_producer(producer).await;
                self.finish(report)
            }
            Err(e) => {
                producer.abort();
                self.transition(PipelineState::Fatal);
                Err(e)
            }
        }
    }

    /// Returns `Ok` when cancelled or when the producer hangs up.
    async fn stream(
        &mut self,
        receiver: &mut mpsc::Receiver<OplogEntry>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let period = self.config.flush_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown signal received, stopping oplog replay");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if self.batch.is_empty() {
                        continue;
                    }
                    self.flush(FlushTrigger::Timer).await?;
                }
                received = receiver.recv() => match received {
                    Some(entry) => {
                        self.stats.entries_forwarded += 1;
                        if self.batch.push(entry) {
                            self.flush(FlushTrigger::SizeThreshold).await?;
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// Apply the buffered entries as one batch and clear the buffer.
    ///
    /// A no-op on an empty buffer. The buffer is cleared whether or not the
    /// apply succeeded; failed entries are never retried.
    async fn flush(&mut self, trigger: FlushTrigger) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let size = self.batch.len();
        tracing::debug!("flushing {} oplog entries ({:?})", size, trigger);

        let outcome = self.applier.apply_ops(self.batch.entries()).await;
        self.batch.clear();
        let (count, last_timestamp) = outcome?.into_result()?;

        self.stats.batches_applied += 1;
        self.stats.entries_applied += count as u64;
        self.stats.last_applied = Some(last_timestamp);

        tracing::info!(
            "{} oplog entries have been applied, total: {}. Last: {}",
            count,
            self.stats.entries_applied,
            last_timestamp.time
        );
        Ok(())
    }

    async fn join_producer(producer: JoinHandle<ProducerReport>) -> ProducerReport {
        match producer.await {
            Ok(report) => report,
            Err(e) => ProducerReport {
                forwarded: 0,
                skipped: 0,
                end: StreamEnd::Failed(ReplayError::Stream(format!("producer task failed: {}", e))),
            },
        }
    }

    fn finish(&mut self, report: ProducerReport) -> Result<ReplayStats> {
        self.stats.noops_skipped = report.skipped;
        tracing::debug!(
            "producer forwarded {} entries and skipped {} no-ops",
            report.forwarded,
            report.skipped
        );

        match report.end {
            StreamEnd::Failed(e) => {
                self.transition(PipelineState::Fatal);
                return Err(e);
            }
            StreamEnd::Exhausted => tracing::info!("oplog cursor exhausted, stopping oplog replay"),
            StreamEnd::Cancelled | StreamEnd::Disconnected => {}
        }

        self.transition(PipelineState::Stopped);
        Ok(self.stats.clone())
    }
}
