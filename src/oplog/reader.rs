// ABOUTME: Tailing cursor over the source oplog, starting from a look-back threshold
// ABOUTME: Bounds each fetch by an idle wait and yields parsed entries in order

use std::time::Duration;

use bson::{doc, Document, Timestamp};
use futures::stream::BoxStream;
use futures::StreamExt;
use mongodb::options::{CursorType, FindOptions, Hint};
use mongodb::Client;

use super::entry::{timestamp_to_rfc3339, OplogEntry};
use crate::config::OplogNamespace;
use crate::error::{ReplayError, Result};

/// Server-side wait per `getMore` before an empty batch comes back.
const MAX_AWAIT_TIME: Duration = Duration::from_secs(1);

/// Ordered stream of parsed entries backing a [`TailingCursor`].
pub type EntryStream = BoxStream<'static, Result<OplogEntry>>;

/// Compute the lower bound for the oplog query: `now - lookback`, counter 0.
///
/// Saturates at the epoch when the look-back exceeds the wall clock.
///
/// # Examples
///
/// ```
/// # use oplog_replicator::oplog::reader::lookback_threshold;
/// # use std::time::Duration;
/// let ts = lookback_threshold(1_700_000_100, Duration::from_secs(60));
/// assert_eq!(ts.time, 1_700_000_040);
/// assert_eq!(ts.increment, 0);
/// ```
pub fn lookback_threshold(now_secs: u64, lookback: Duration) -> Timestamp {
    let secs = now_secs.saturating_sub(lookback.as_secs());
    Timestamp {
        time: secs.min(u32::MAX as u64) as u32,
        increment: 0,
    }
}

/// Filter selecting every entry at or after `threshold`.
pub fn oplog_query(threshold: Timestamp) -> Document {
    doc! { "ts": { "$gte": threshold } }
}

/// Find options for tailing the oplog.
///
/// Natural order is the oplog's insertion order, which is what the replay
/// scan optimization on the server keys off.
pub fn tailing_find_options() -> FindOptions {
    FindOptions::builder()
        .cursor_type(CursorType::TailableAwait)
        .no_cursor_timeout(true)
        .max_await_time(MAX_AWAIT_TIME)
        .hint(Hint::Keys(doc! { "$natural": 1 }))
        .build()
}

/// Opens tailing cursors over a source oplog.
#[derive(Debug, Clone)]
pub struct TailingCursorBuilder {
    namespace: OplogNamespace,
    lookback: Duration,
    idle_wait: Duration,
}

impl TailingCursorBuilder {
    pub fn new(namespace: OplogNamespace, lookback: Duration, idle_wait: Duration) -> Self {
        Self {
            namespace,
            lookback,
            idle_wait,
        }
    }

    pub fn namespace(&self) -> &OplogNamespace {
        &self.namespace
    }

    /// Threshold for a cursor opened at `now_secs`.
    pub fn threshold_at(&self, now_secs: u64) -> Timestamp {
        lookback_threshold(now_secs, self.lookback)
    }

    /// Open the tailing query against the source.
    ///
    /// The threshold is computed from the wall clock at call time, so a
    /// cursor reopened later starts from a later position.
    pub async fn open(&self, client: &Client) -> Result<TailingCursor> {
        let now_secs = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        let threshold = self.threshold_at(now_secs);

        let collection = client
            .database(&self.namespace.database)
            .collection::<Document>(&self.namespace.collection);

        let cursor = collection
            .find(oplog_query(threshold))
            .with_options(tailing_find_options())
            .await
            .map_err(|e| ReplayError::Stream(e.to_string()))?;

        tracing::debug!(
            "tailing `{}` from {} ({})",
            self.namespace,
            threshold.time,
            timestamp_to_rfc3339(threshold)
        );

        let entries = cursor
            .map(|item| match item {
                Ok(document) => OplogEntry::from_document(document),
                Err(e) => Err(ReplayError::Stream(e.to_string())),
            })
            .boxed();

        Ok(TailingCursor::new(entries, threshold, self.idle_wait))
    }
}

/// Handle to an open tailing query.
///
/// Not restartable: once it reports exhaustion it stays exhausted, and a
/// new cursor has to be opened from a fresh threshold.
pub struct TailingCursor {
    entries: EntryStream,
    threshold: Timestamp,
    idle_wait: Duration,
    exhausted: bool,
}

impl TailingCursor {
    pub fn new(entries: EntryStream, threshold: Timestamp, idle_wait: Duration) -> Self {
        Self {
            entries,
            threshold,
            idle_wait,
            exhausted: false,
        }
    }

    pub fn threshold(&self) -> Timestamp {
        self.threshold
    }

    pub fn idle_wait(&self) -> Duration {
        self.idle_wait
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Wait for the next entry.
    ///
    /// Returns `None` when the underlying stream ends or nothing arrives
    /// within the idle wait.
    pub async fn next_entry(&mut self) -> Option<Result<OplogEntry>> {
        if self.exhausted {
            return None;
        }

        match tokio::time::timeout(self.idle_wait, self.entries.next()).await {
            Ok(Some(item)) => Some(item),
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Err(_) => {
                tracing::debug!(
                    "no new oplog entries within {:?}, closing cursor",
                    self.idle_wait
                );
                self.exhausted = true;
                None
            }
        }
    }
}
