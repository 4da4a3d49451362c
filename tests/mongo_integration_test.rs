// ABOUTME: Live tests against a real source replica set and destination server
// ABOUTME: Ignored by default; set TEST_SOURCE_URI and TEST_DESTINATION_URI and run with --ignored

use std::env;
use std::time::Duration;

use bson::{doc, Document};
use oplog_replicator::config::{
    ConnectionConfig, OplogNamespace, PipelineConfig, ReplayConfig, DEFAULT_OPLOG_NS,
};
use oplog_replicator::connection::connect;
use oplog_replicator::error::ServerRole;
use oplog_replicator::oplog::{MongoApplier, ReplayPipeline, TailingCursorBuilder};
use oplog_replicator::ReplayDaemon;
use tokio_util::sync::CancellationToken;

/// Helper to get test server URIs from environment
fn get_test_uris() -> Option<(String, String)> {
    let source = env::var("TEST_SOURCE_URI").ok()?;
    let destination = env::var("TEST_DESTINATION_URI").ok()?;
    Some((source, destination))
}

/// Unique database name so concurrent runs do not collide
fn test_db_name(suffix: &str) -> String {
    format!(
        "oplog_replicator_test_{}_{}",
        suffix,
        chrono::Utc::now().timestamp_millis()
    )
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        max_batch_size: 100,
        flush_interval: Duration::from_millis(200),
        idle_wait: Duration::from_secs(3),
    }
}

async fn seed_source(source: &mongodb::Client, db_name: &str, count: i32) {
    let collection = source.database(db_name).collection::<Document>("items");
    let docs: Vec<Document> = (0..count).map(|i| doc! { "_id": i, "value": i * 10 }).collect();
    collection
        .insert_many(docs)
        .await
        .expect("Failed to seed source collection");
    collection
        .update_one(doc! { "_id": 0 }, doc! { "$set": { "value": -1 } })
        .await
        .expect("Failed to update source document");
    collection
        .delete_one(doc! { "_id": 1 })
        .await
        .expect("Failed to delete source document");
}

async fn cleanup(source: &mongodb::Client, destination: &mongodb::Client, db_name: &str) {
    let _ = destination.database(db_name).drop().await;
    let _ = source.database(db_name).drop().await;
}

/// Test: both roles connect and answer a ping
#[tokio::test]
#[ignore]
async fn test_connect_both_roles() {
    let (source_uri, destination_uri) =
        get_test_uris().expect("TEST_SOURCE_URI and TEST_DESTINATION_URI must be set");

    connect(&ConnectionConfig::new(source_uri), ServerRole::Source)
        .await
        .expect("Failed to connect to source");
    connect(&ConnectionConfig::new(destination_uri), ServerRole::Destination)
        .await
        .expect("Failed to connect to destination");
}

/// Test: recent writes on the source are replayed onto the destination
#[tokio::test]
#[ignore]
async fn test_pipeline_replays_recent_writes() {
    let (source_uri, destination_uri) =
        get_test_uris().expect("TEST_SOURCE_URI and TEST_DESTINATION_URI must be set");
    let source_config = ConnectionConfig::new(source_uri);
    let destination_config = ConnectionConfig::new(destination_uri);

    let source = connect(&source_config, ServerRole::Source)
        .await
        .expect("Failed to connect to source");
    let destination = connect(&destination_config, ServerRole::Destination)
        .await
        .expect("Failed to connect to destination");

    let db_name = test_db_name("pipeline");
    seed_source(&source, &db_name, 5).await;

    let cursor = TailingCursorBuilder::new(
        OplogNamespace::parse(DEFAULT_OPLOG_NS).unwrap(),
        Duration::from_secs(30),
        pipeline_config().idle_wait,
    )
    .open(&source)
    .await
    .expect("Failed to open tailing cursor");

    let mut pipeline = ReplayPipeline::new(pipeline_config(), MongoApplier::new(&destination));
    let stats = pipeline
        .run(cursor, CancellationToken::new())
        .await
        .expect("Replay failed");
    assert!(stats.entries_applied >= 7, "got {:?}", stats);

    let replayed = destination.database(&db_name).collection::<Document>("items");
    assert_eq!(replayed.count_documents(doc! {}).await.unwrap(), 4);
    let first = replayed
        .find_one(doc! { "_id": 0 })
        .await
        .unwrap()
        .expect("document 0 was not replayed");
    assert_eq!(first.get_i32("value").unwrap(), -1);
    assert!(replayed
        .find_one(doc! { "_id": 1 })
        .await
        .unwrap()
        .is_none());

    cleanup(&source, &destination, &db_name).await;
}

/// Test: the daemon stops cleanly when cancelled
#[tokio::test]
#[ignore]
async fn test_daemon_stops_on_cancel() {
    let (source_uri, destination_uri) =
        get_test_uris().expect("TEST_SOURCE_URI and TEST_DESTINATION_URI must be set");

    let daemon = ReplayDaemon::new(ReplayConfig {
        source: ConnectionConfig::new(source_uri),
        destination: ConnectionConfig::new(destination_uri),
        oplog_ns: OplogNamespace::parse(DEFAULT_OPLOG_NS).unwrap(),
        lookback: Duration::from_secs(1),
        pipeline: PipelineConfig {
            idle_wait: Duration::from_secs(600),
            ..pipeline_config()
        },
    });

    let shutdown = CancellationToken::new();
    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(30), daemon.run(shutdown))
        .await
        .expect("daemon did not stop after cancellation");
    result.expect("daemon returned an error");
}
