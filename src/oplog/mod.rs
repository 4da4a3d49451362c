// ABOUTME: Oplog tailing and batched replay onto a destination server
// ABOUTME: Reader -> producer -> batch -> writer, driven by the pipeline coordinator

pub mod batch;
pub mod daemon;
pub mod entry;
pub mod pipeline;
pub mod producer;
pub mod reader;
pub mod writer;

pub use batch::{FlushTrigger, OplogBatch};
pub use daemon::ReplayDaemon;
pub use entry::{timestamp_from_u64, timestamp_to_rfc3339, timestamp_to_u64, OpKind, OplogEntry};
pub use pipeline::{PipelineState, ReplayPipeline, ReplayStats};
pub use producer::{ProducerReport, StreamEnd, StreamProducer};
pub use reader::{lookback_threshold, oplog_query, EntryStream, TailingCursor, TailingCursorBuilder};
pub use writer::{ApplyFuture, ApplyOutcome, MongoApplier, OplogApplier};
