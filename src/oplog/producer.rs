// ABOUTME: Stream producer task: reads the tailing cursor, drops no-ops, forwards the rest
// ABOUTME: The capacity-one hand-off channel is the only backpressure between read and apply

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::entry::{timestamp_to_rfc3339, OplogEntry};
use super::reader::TailingCursor;
use crate::error::ReplayError;

/// Why the producer stopped.
#[derive(Debug)]
pub enum StreamEnd {
    /// The cursor ended or sat idle past its idle wait.
    Exhausted,
    /// Reading the cursor failed.
    Failed(ReplayError),
    /// The coordinator stopped receiving.
    Disconnected,
    /// The stop token was cancelled.
    Cancelled,
}

/// Completion record of a producer run.
#[derive(Debug)]
pub struct ProducerReport {
    /// Entries handed to the coordinator.
    pub forwarded: u64,
    /// No-op entries dropped.
    pub skipped: u64,
    pub end: StreamEnd,
}

/// Reads a [`TailingCursor`] and forwards every non-noop entry, in order.
pub struct StreamProducer {
    cursor: TailingCursor,
    sender: mpsc::Sender<OplogEntry>,
    stop: CancellationToken,
    forwarded: u64,
    skipped: u64,
}

impl StreamProducer {
    pub fn new(
        cursor: TailingCursor,
        sender: mpsc::Sender<OplogEntry>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            cursor,
            sender,
            stop,
            forwarded: 0,
            skipped: 0,
        }
    }

    /// Run until the cursor ends, fails, the receiver goes away or `stop`
    /// is cancelled.
    ///
    /// Completion is only recorded in the returned report; dropping the
    /// sender when this returns is what tells the coordinator the stream is
    /// over.
    pub async fn run(mut self) -> ProducerReport {
        let end = loop {
            let next = tokio::select! {
                biased;

                _ = self.stop.cancelled() => break StreamEnd::Cancelled,
                next = self.cursor.next_entry() => next,
            };
            let entry = match next {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    tracing::error!("{}", e);
                    break StreamEnd::Failed(e);
                }
                None => break StreamEnd::Exhausted,
            };

            if entry.is_noop() {
                tracing::trace!("skipping no-op for namespace `{}`", entry.namespace);
                self.skipped += 1;
                continue;
            }

            let timestamp = entry.timestamp;
            let sent = tokio::select! {
                biased;

                _ = self.stop.cancelled() => break StreamEnd::Cancelled,
                sent = self.sender.send(entry) => sent,
            };
            if sent.is_err() {
                tracing::debug!("oplog receiver closed, stopping producer");
                break StreamEnd::Disconnected;
            }
            self.forwarded += 1;

            if self.forwarded == 1 {
                tracing::info!(
                    "Got first oplog entry with timestamp {} ({})",
                    timestamp.time,
                    timestamp_to_rfc3339(timestamp)
                );
                tracing::info!(
                    "If this is newer than the destination's last applied oplog entry, stop now"
                );
            }
        };

        if matches!(end, StreamEnd::Exhausted) {
            tracing::debug!("done reading oplog, {} entries forwarded", self.forwarded);
        }

        ProducerReport {
            forwarded: self.forwarded,
            skipped: self.skipped,
            end,
        }
    }
}
