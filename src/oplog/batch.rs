// ABOUTME: Batch accumulator for forwarded oplog entries
// ABOUTME: Signals a flush when the size threshold is reached; the timer trigger lives in the pipeline

use bson::Timestamp;

use super::entry::OplogEntry;

/// What caused a batch to be flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The periodic timer fired with a non-empty buffer.
    Timer,
    /// The buffer reached the maximum batch size.
    SizeThreshold,
    /// The pipeline is stopping and flushes what is left.
    Drain,
}

/// Ordered buffer of entries waiting to be applied.
///
/// Appended to and cleared only by the coordinator. Clearing keeps the
/// allocation so steady-state batching does not reallocate.
#[derive(Debug)]
pub struct OplogBatch {
    entries: Vec<OplogEntry>,
    max_size: usize,
}

impl OplogBatch {
    /// Create an empty batch. `max_size` is clamped to at least 1.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: Vec::with_capacity(max_size),
            max_size,
        }
    }

    /// Append an entry; returns `true` when the batch is now full.
    pub fn push(&mut self, entry: OplogEntry) -> bool {
        self.entries.push(entry);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn entries(&self) -> &[OplogEntry] {
        &self.entries
    }

    /// Timestamp of the newest buffered entry.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.entries.last().map(|entry| entry.timestamp)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
