// ABOUTME: Shared helpers for integration tests
// ABOUTME: Channel-fed cursors, a recording applier and oplog entry builders

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bson::{doc, Timestamp};
use futures::{stream, StreamExt};
use oplog_replicator::error::Result;
use oplog_replicator::oplog::{ApplyFuture, ApplyOutcome, OplogApplier, OplogEntry, TailingCursor};
use tokio::sync::mpsc;

pub fn entry(time: u32, op: &str) -> OplogEntry {
    let ts = Timestamp { time, increment: 0 };
    OplogEntry::from_document(doc! {
        "ts": ts,
        "op": op,
        "ns": "app.items",
        "o": { "_id": time as i64 },
    })
    .unwrap()
}

pub fn insert(time: u32) -> OplogEntry {
    entry(time, "i")
}

pub fn noop(time: u32) -> OplogEntry {
    entry(time, "n")
}

/// A cursor fed from a channel; dropping the sender ends the stream.
pub fn channel_cursor(idle_wait: Duration) -> (mpsc::UnboundedSender<Result<OplogEntry>>, TailingCursor) {
    let (tx, rx) = mpsc::unbounded_channel();
    let entries = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    let cursor = TailingCursor::new(entries, Timestamp { time: 0, increment: 0 }, idle_wait);
    (tx, cursor)
}

/// Records every apply call; optionally rejects one of them.
#[derive(Clone, Default)]
pub struct RecordingApplier {
    calls: Arc<Mutex<Vec<Vec<OplogEntry>>>>,
    reject: Option<(usize, String)>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `call`-th apply (1-based) with `reason`.
    pub fn rejecting(call: usize, reason: &str) -> Self {
        Self {
            calls: Arc::default(),
            reject: Some((call, reason.to_string())),
        }
    }

    pub fn batches(&self) -> Vec<Vec<OplogEntry>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn batch_times(&self) -> Vec<Vec<u32>> {
        self.batches()
            .iter()
            .map(|batch| batch.iter().map(|e| e.timestamp.time).collect())
            .collect()
    }
}

impl OplogApplier for RecordingApplier {
    fn apply_ops<'a>(&'a mut self, entries: &'a [OplogEntry]) -> ApplyFuture<'a> {
        Box::pin(async move {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(entries.to_vec());
                calls.len()
            };
            match &self.reject {
                Some((reject_call, reason)) if *reject_call == call => Ok(ApplyOutcome::Rejected {
                    reason: reason.clone(),
                }),
                _ => Ok(ApplyOutcome::Applied {
                    count: entries.len(),
                    last_timestamp: entries[entries.len() - 1].timestamp,
                }),
            }
        })
    }
}
