//! Connector contract tests.
//!
//! Every property of the base, batch, and streaming contracts is checked
//! against the backends that need no external service: the in-process
//! document collection and the file connector over a scratch directory.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use serde_json::{Value, json};
use tempfile::TempDir;
use worldstore_core::{
    BatchConnector, Capability, Connector, ConnectorFailure, FileSettings, ListOptions,
    LoadOptions, SaveOptions, StoreConfig, StreamUpdate, StreamingConnector,
};
use worldstore_db::{AnyConnector, ConnectorRegistry, FileConnector, MongoConnector};
use worldstore_types::{OperationType, ValidationError};

// =============================================================================
// Fixtures
// =============================================================================

fn file_connector() -> (TempDir, FileConnector) {
    let dir = tempfile::tempdir().unwrap();
    let connector = FileConnector::new(FileSettings {
        name: String::from("files"),
        directory: dir.path().join("store"),
    });
    (dir, connector)
}

fn world(name: &str, saved_at: Value, x: i64) -> Value {
    json!({"world_name": name, "saved_at": saved_at, "x": x})
}

async fn load(connector: &impl Connector, source: &str) -> Option<Value> {
    connector
        .load_world_data(Some(source), &LoadOptions::default())
        .await
        .unwrap()
        .map(Value::from)
}

// =============================================================================
// Shared property checks
// =============================================================================

async fn check_round_trip(connector: &impl Connector) {
    let document = json!({
        "world_name": "Harbor",
        "saved_at": "2026-03-01T12:00:00",
        "agents": [{"name": "Ada", "mood": "curious"}],
        "environment": {"weather": "fog", "tick": 17}
    });
    connector
        .save_world_data(&document, None, &SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(load(connector, "Harbor").await, Some(document));
}

async fn check_scenario(connector: &impl Connector) {
    connector
        .save_world_data(&world("w1", json!("t1"), 1), None, &SaveOptions::default())
        .await
        .unwrap();

    let refused = connector
        .save_world_data(&world("w1", json!("t1"), 2), None, &SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(refused, ConnectorFailure::DuplicateIdentity(ref key) if key.world_name == "w1"));
    assert_eq!(load(connector, "w1").await, Some(world("w1", json!("t1"), 1)));

    connector
        .save_world_data(
            &world("w1", json!("t1"), 2),
            None,
            &SaveOptions::default().replacing(),
        )
        .await
        .unwrap();
    assert_eq!(
        load(connector, "w1").await,
        Some(json!({"world_name": "w1", "saved_at": "t1", "x": 2}))
    );
}

async fn check_delete(connector: &impl Connector) {
    for (name, saved_at) in [("keep", 1), ("gone", 2), ("gone", 3)] {
        connector
            .save_world_data(&world(name, json!(saved_at), 0), None, &SaveOptions::default())
            .await
            .unwrap();
    }
    connector
        .save_world_data(
            &world("gone", json!(4), 0),
            None,
            &SaveOptions::default().with_data_type("partial"),
        )
        .await
        .unwrap();

    connector.delete_data("gone").await.unwrap();
    connector.delete_data("never-saved").await.unwrap();

    let listed = connector
        .list_available_data(&ListOptions::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![String::from("keep (latest: 1)")]);
    assert_eq!(load(connector, "gone").await, None);
    assert_eq!(
        connector
            .load_world_data(Some("gone"), &LoadOptions::default().with_data_type("partial"))
            .await
            .unwrap(),
        None
    );
}

async fn check_listing(connector: &impl Connector) {
    for (name, saved_at) in [("a", 1), ("b", 5), ("a", 9), ("c", 3)] {
        connector
            .save_world_data(&world(name, json!(saved_at), 0), None, &SaveOptions::default())
            .await
            .unwrap();
    }
    let listed = connector
        .list_available_data(&ListOptions::default())
        .await
        .unwrap();
    assert_eq!(listed, vec!["a (latest: 9)", "b (latest: 5)", "c (latest: 3)"]);

    let capped = connector
        .list_available_data(&ListOptions::limited(2))
        .await
        .unwrap();
    assert_eq!(capped, vec!["a (latest: 9)", "b (latest: 5)"]);

    let latest = connector
        .load_world_data(None, &LoadOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.world_key(), "a");
    assert_eq!(latest.saved_at(), &json!(9));

    let exact = connector
        .load_world_data(Some("a"), &LoadOptions::default().at(json!(1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exact.saved_at(), &json!(1));
}

async fn check_batches(connector: &impl BatchConnector) {
    let results = connector
        .save_batch(
            &[
                world("first", json!(1), 1),
                json!({"world_name": "broken"}),
                world("second", json!(2), 2),
            ],
            None,
            &SaveOptions::default(),
        )
        .await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert_eq!(
        results[1],
        Err(ConnectorFailure::Validation(ValidationError::MissingField(
            "saved_at"
        )))
    );
    assert!(results[2].is_ok());

    let loaded = connector
        .load_batch(&["second", "missing", "first"], &LoadOptions::default())
        .await;
    assert_eq!(loaded.len(), 3);
    assert_eq!(
        loaded[0].as_ref().unwrap().as_ref().unwrap().world_key(),
        "second"
    );
    assert_eq!(loaded[1], Ok(None));
    assert_eq!(
        loaded[2].as_ref().unwrap().as_ref().unwrap().world_key(),
        "first"
    );
}

async fn check_invalid_is_counted(connector: &impl Connector) {
    for invalid in [
        json!({"saved_at": 1}),
        json!({"world_name": "w"}),
        json!(["not", "a", "mapping"]),
    ] {
        let err = connector
            .save_world_data(&invalid, None, &SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorFailure::Validation(_)));
    }
    let info = connector.get_connector_info();
    assert_eq!(info.stats.operation_count, 3);
    assert_eq!(
        info.stats.last_operation.unwrap().operation_type,
        OperationType::FailedSave
    );
}

async fn check_saved_at_types_stay_apart(connector: &impl Connector) {
    connector
        .save_world_data(&world("w", json!("1"), 1), None, &SaveOptions::default())
        .await
        .unwrap();
    connector
        .save_world_data(&world("w", json!(1), 2), None, &SaveOptions::default())
        .await
        .unwrap();
    for (saved_at, x) in [(json!("1"), 1), (json!(1), 2)] {
        let loaded = connector
            .load_world_data(Some("w"), &LoadOptions::default().at(saved_at.clone()))
            .await
            .unwrap();
        assert_eq!(loaded.map(Value::from), Some(world("w", saved_at, x)));
    }
}

// =============================================================================
// In-process collection
// =============================================================================

#[tokio::test]
async fn memory_round_trip() {
    check_round_trip(&MongoConnector::in_memory("mem")).await;
}

#[tokio::test]
async fn memory_duplicate_and_replace_scenario() {
    check_scenario(&MongoConnector::in_memory("mem")).await;
}

#[tokio::test]
async fn memory_delete_removes_whole_world() {
    check_delete(&MongoConnector::in_memory("mem")).await;
}

#[tokio::test]
async fn memory_listing_and_load_modes() {
    check_listing(&MongoConnector::in_memory("mem")).await;
}

#[tokio::test]
async fn memory_batches_keep_order_and_isolation() {
    check_batches(&MongoConnector::in_memory("mem")).await;
}

#[tokio::test]
async fn memory_invalid_documents_never_reach_the_collection() {
    let connector = MongoConnector::in_memory("mem");
    check_invalid_is_counted(&connector).await;
    assert_eq!(connector.backend_calls(), 0);
    assert!(connector.memory_collection().unwrap().is_empty());
}

#[tokio::test]
async fn memory_saved_at_types_stay_apart() {
    check_saved_at_types_stay_apart(&MongoConnector::in_memory("mem")).await;
}

#[tokio::test]
async fn memory_offline_collection_degrades_every_operation() {
    let connector = MongoConnector::in_memory("mem");
    connector.set_offline(true);

    let save = connector
        .save_world_data(&world("w", json!(1), 0), None, &SaveOptions::default())
        .await;
    assert!(matches!(save, Err(ConnectorFailure::BackendUnavailable(_))));
    assert!(connector
        .load_world_data(None, &LoadOptions::default())
        .await
        .is_err());
    assert!(connector
        .list_available_data(&ListOptions::default())
        .await
        .is_err());
    assert!(connector.delete_data("w").await.is_err());
    assert_eq!(
        connector
            .get_connector_info()
            .stats
            .last_operation
            .unwrap()
            .operation_type,
        OperationType::FailedDelete
    );

    connector.set_offline(false);
    connector
        .save_world_data(&world("w", json!(1), 0), None, &SaveOptions::default())
        .await
        .unwrap();
    assert_eq!(connector.get_connector_info().stats.operation_count, 5);
}

#[tokio::test]
async fn newest_write_wins_within_a_world() {
    let connector = MongoConnector::in_memory("mem");
    for saved_at in [json!(9), json!(2)] {
        connector
            .save_world_data(&world("w", saved_at, 0), None, &SaveOptions::default())
            .await
            .unwrap();
    }
    // Source given without saved_at: write order decides, not saved_at.
    let loaded = load(&connector, "w").await.unwrap();
    assert_eq!(loaded["saved_at"], json!(2));
}

// =============================================================================
// File connector
// =============================================================================

#[tokio::test]
async fn file_round_trip() {
    let (_dir, connector) = file_connector();
    check_round_trip(&connector).await;
}

#[tokio::test]
async fn file_duplicate_and_replace_scenario() {
    let (_dir, connector) = file_connector();
    check_scenario(&connector).await;
}

#[tokio::test]
async fn file_delete_removes_whole_world() {
    let (_dir, connector) = file_connector();
    check_delete(&connector).await;
}

#[tokio::test]
async fn file_listing_and_load_modes() {
    let (_dir, connector) = file_connector();
    check_listing(&connector).await;
}

#[tokio::test]
async fn file_batches_keep_order_and_isolation() {
    let (_dir, connector) = file_connector();
    check_batches(&connector).await;
}

#[tokio::test]
async fn file_saved_at_types_stay_apart() {
    let (_dir, connector) = file_connector();
    check_saved_at_types_stay_apart(&connector).await;
}

#[tokio::test]
async fn file_invalid_documents_never_touch_the_disk() {
    let (_dir, connector) = file_connector();
    check_invalid_is_counted(&connector).await;
    assert!(!connector.root().exists());
}

#[tokio::test]
async fn file_duplicate_is_found_under_another_destination() {
    let (_dir, connector) = file_connector();
    connector
        .save_world_data(&world("w", json!(1), 1), Some("runs/a"), &SaveOptions::default())
        .await
        .unwrap();
    let err = connector
        .save_world_data(&world("w", json!(1), 2), Some("b"), &SaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorFailure::DuplicateIdentity(_)));
    assert_eq!(load(&connector, "w").await, Some(world("w", json!(1), 1)));
}

#[tokio::test]
async fn file_streaming_session_lifecycle() {
    let (_dir, connector) = file_connector();

    let idle_push = connector
        .stream_world_data(&world("w", json!(1), 0))
        .await
        .unwrap_err();
    assert!(matches!(idle_push, ConnectorFailure::StreamState(_)));
    connector.stop_streaming().await.unwrap();
    connector.stop_streaming().await.unwrap();

    connector.start_streaming(Some("live")).await.unwrap();
    assert!(connector.is_streaming().await);
    assert!(matches!(
        connector.start_streaming(Some("other")).await,
        Err(ConnectorFailure::StreamState(_))
    ));
    connector
        .stream_world_data(&world("w", json!(1), 0))
        .await
        .unwrap();
    assert!(matches!(
        connector.stream_world_data(&json!({"world_name": "w"})).await,
        Err(ConnectorFailure::Validation(_))
    ));
    connector
        .stream_world_data(&world("w", json!(2), 0))
        .await
        .unwrap();
    connector.stop_streaming().await.unwrap();
    connector.stop_streaming().await.unwrap();
    assert!(!connector.is_streaming().await);

    let log = std::fs::read_to_string(connector.stream_path("live")).unwrap();
    let updates: Vec<StreamUpdate> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].sequence, 1);
    assert_eq!(updates[1].sequence, 2);
    assert_eq!(updates[1].world_data.saved_at(), &json!(2));
    assert_eq!(updates[0].destination, "live");
}

// =============================================================================
// Type-erased connectors and the registry
// =============================================================================

#[tokio::test]
async fn any_connector_reports_missing_tiers() {
    let connector = AnyConnector::from(MongoConnector::in_memory("mem"));
    let err = connector.start_streaming(None).await.unwrap_err();
    assert_eq!(err.capability, Capability::Streaming);
    assert_eq!(
        err.to_string(),
        "connector 'mem' does not support streaming operations"
    );

    let (_dir, files) = file_connector();
    let connector = AnyConnector::from(files);
    assert!(connector.start_streaming(None).await.unwrap().is_ok());
    assert!(connector.is_streaming().await);
    assert!(connector.stop_streaming().await.unwrap().is_ok());
}

#[tokio::test]
async fn registry_connectors_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "connectors:\n  - type: memory\n    name: scratch\n  - type: file\n    name: disk\n    directory: {}\n",
        dir.path().display()
    );
    let config = StoreConfig::parse(&yaml).unwrap();
    let registry = ConnectorRegistry::from_config(&config).unwrap();

    let scratch = registry.get("scratch").unwrap();
    scratch
        .save_world_data(&world("w1", json!("t1"), 1), None, &SaveOptions::default())
        .await
        .unwrap();

    let disk = registry.get("disk").unwrap();
    assert_eq!(load(disk, "w1").await, None);
    assert_eq!(load(scratch, "w1").await, Some(world("w1", json!("t1"), 1)));

    let described = registry.describe_all();
    assert_eq!(described[0].name, "disk");
    assert_eq!(described[0].stats.operation_count, 1);
    assert_eq!(described[1].name, "scratch");
    assert_eq!(described[1].stats.operation_count, 2);
}
