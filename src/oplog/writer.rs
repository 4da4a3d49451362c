// ABOUTME: Destination applier: one atomic applyOps command per batch
// ABOUTME: Turns the loosely-typed {ok, errmsg} reply into an Applied/Rejected outcome

use std::future::Future;
use std::pin::Pin;

use bson::{doc, Bson, Document, Timestamp};
use mongodb::error::ErrorKind;
use mongodb::{Client, Database};

use super::entry::OplogEntry;
use crate::error::{ReplayError, Result};

/// Boxed future returned by [`OplogApplier::apply_ops`].
pub type ApplyFuture<'a> = Pin<Box<dyn Future<Output = Result<ApplyOutcome>> + Send + 'a>>;

/// Result of an apply request the destination answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The whole batch was applied.
    Applied {
        count: usize,
        last_timestamp: Timestamp,
    },
    /// The destination refused the batch.
    Rejected { reason: String },
}

impl ApplyOutcome {
    /// Convert a rejection into the fatal [`ReplayError::Rejected`].
    pub fn into_result(self) -> Result<(usize, Timestamp)> {
        match self {
            ApplyOutcome::Applied {
                count,
                last_timestamp,
            } => Ok((count, last_timestamp)),
            ApplyOutcome::Rejected { reason } => Err(ReplayError::Rejected(reason)),
        }
    }
}

/// Applies ordered batches of oplog entries to a destination.
///
/// Implementations must apply the slice as one unit, in order. An `Err`
/// means the request could not be carried out at all (transport failure);
/// a destination that answered but refused returns
/// `Ok(ApplyOutcome::Rejected { .. })`.
pub trait OplogApplier: Send {
    fn apply_ops<'a>(&'a mut self, entries: &'a [OplogEntry]) -> ApplyFuture<'a>;
}

/// Build the `applyOps` admin command for a batch, preserving entry order.
pub fn build_apply_ops_command(entries: &[OplogEntry]) -> Document {
    let ops: Vec<Bson> = entries
        .iter()
        .map(|entry| Bson::Document(entry.raw().clone()))
        .collect();
    doc! { "applyOps": ops }
}

fn response_ok(response: &Document) -> bool {
    match response.get("ok") {
        Some(Bson::Boolean(ok)) => *ok,
        Some(Bson::Double(ok)) => *ok == 1.0,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        _ => false,
    }
}

/// Interpret an `applyOps` reply for the batch it was sent for.
///
/// A missing or non-truthy `ok` is a rejection; `errmsg` becomes the reason.
/// On success the applied count comes from the reply's `applied` field when
/// present, otherwise the batch length.
pub fn parse_apply_response(response: &Document, entries: &[OplogEntry]) -> ApplyOutcome {
    if !response_ok(response) {
        let reason = response
            .get_str("errmsg")
            .map(str::to_string)
            .unwrap_or_else(|_| "unknown error".to_string());
        return ApplyOutcome::Rejected { reason };
    }

    let count = match response.get("applied") {
        Some(Bson::Int32(n)) => *n as usize,
        Some(Bson::Int64(n)) => *n as usize,
        _ => entries.len(),
    };
    let last_timestamp = entries
        .last()
        .map(|entry| entry.timestamp)
        .unwrap_or(Timestamp {
            time: 0,
            increment: 0,
        });

    ApplyOutcome::Applied {
        count,
        last_timestamp,
    }
}

/// Applies batches through `applyOps` on the destination's `admin` database.
pub struct MongoApplier {
    admin: Database,
}

impl MongoApplier {
    pub fn new(client: &Client) -> Self {
        Self {
            admin: client.database("admin"),
        }
    }
}

impl OplogApplier for MongoApplier {
    fn apply_ops<'a>(&'a mut self, entries: &'a [OplogEntry]) -> ApplyFuture<'a> {
        Box::pin(async move {
            if entries.is_empty() {
                return Err(ReplayError::Apply("refusing to apply an empty batch".to_string()));
            }

            let command = build_apply_ops_command(entries);
            match self.admin.run_command(command).await {
                Ok(response) => Ok(parse_apply_response(&response, entries)),
                // The driver turns `ok: 0` replies into command errors.
                Err(e) => match e.kind.as_ref() {
                    ErrorKind::Command(command_error) => Ok(ApplyOutcome::Rejected {
                        reason: command_error.message.clone(),
                    }),
                    _ => Err(ReplayError::Apply(e.to_string())),
                },
            }
        })
    }
}
