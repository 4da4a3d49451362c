// ABOUTME: Oplog entry model and hybrid timestamp helpers
// ABOUTME: Parses raw oplog documents while keeping them intact for pass-through

use bson::{Document, Timestamp};
use std::fmt;

use crate::error::{ReplayError, Result};

/// Pack a hybrid timestamp into its 64-bit wire form (seconds high, counter low).
pub fn timestamp_to_u64(ts: Timestamp) -> u64 {
    ((ts.time as u64) << 32) | ts.increment as u64
}

/// Inverse of [`timestamp_to_u64`].
pub fn timestamp_from_u64(value: u64) -> Timestamp {
    Timestamp {
        time: (value >> 32) as u32,
        increment: (value & 0xFFFF_FFFF) as u32,
    }
}

/// Render a timestamp as RFC 3339 for operator-facing log lines.
pub fn timestamp_to_rfc3339(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts.time as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.time.to_string())
}

/// Operation kind recorded in the `op` field of an oplog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    Command,
    Noop,
    /// Legacy database declaration (`db`), emitted by old master/slave setups.
    DbDeclare,
    Other(String),
}

impl OpKind {
    pub fn parse(code: &str) -> Self {
        match code {
            "i" => OpKind::Insert,
            "u" => OpKind::Update,
            "d" => OpKind::Delete,
            "c" => OpKind::Command,
            "n" => OpKind::Noop,
            "db" => OpKind::DbDeclare,
            other => OpKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OpKind::Insert => "i",
            OpKind::Update => "u",
            OpKind::Delete => "d",
            OpKind::Command => "c",
            OpKind::Noop => "n",
            OpKind::DbDeclare => "db",
            OpKind::Other(code) => code,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, OpKind::Noop)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single oplog entry read from the source.
///
/// The typed fields are what the pipeline inspects (filtering, ordering,
/// logging). `raw` is the document exactly as read from the source and is
/// what gets sent to the destination, so no field is lost or rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct OplogEntry {
    pub timestamp: Timestamp,
    pub op: OpKind,
    pub namespace: String,
    pub object: Document,
    pub update_selector: Option<Document>,
    raw: Document,
}

impl OplogEntry {
    /// Parse an oplog document.
    ///
    /// `ts`, `op` and `ns` are required. `o` defaults to an empty document
    /// (some no-op entries omit it), `o2` is optional.
    pub fn from_document(raw: Document) -> Result<Self> {
        let timestamp = raw
            .get_timestamp("ts")
            .map_err(|e| malformed("ts", e))?;
        let op = raw
            .get_str("op")
            .map(OpKind::parse)
            .map_err(|e| malformed("op", e))?;
        let namespace = raw
            .get_str("ns")
            .map(str::to_string)
            .map_err(|e| malformed("ns", e))?;
        let object = raw.get_document("o").cloned().unwrap_or_default();
        let update_selector = raw.get_document("o2").ok().cloned();

        Ok(Self {
            timestamp,
            op,
            namespace,
            object,
            update_selector,
            raw,
        })
    }

    /// The entry as read from the source.
    pub fn raw(&self) -> &Document {
        &self.raw
    }

    pub fn is_noop(&self) -> bool {
        self.op.is_noop()
    }
}

fn malformed(field: &str, err: impl fmt::Display) -> ReplayError {
    ReplayError::Stream(format!("malformed oplog entry, field '{}': {}", field, err))
}
