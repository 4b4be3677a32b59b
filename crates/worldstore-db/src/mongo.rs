//! `MongoDB` document store connector.
//!
//! One document per snapshot, keyed by `(world_name, saved_at, data_type)`.
//! The payload is kept as JSON text so arbitrary world data round-trips
//! unchanged; the identity fields are copied out for querying.
//!
//! # Document layout
//!
//! | Field | BSON type | Description |
//! |-------|-----------|-------------|
//! | `record_id` | String | UUID v7 assigned on insert |
//! | `world_name` | String | World key |
//! | `saved_at` | any | Snapshot token, as given by the caller |
//! | `data_type` | String | Snapshot variant (`complete` by default) |
//! | `world_data_json` | String | The full document |
//! | `created_at` | Date | Write time, refreshed on replace |
//! | `connector_info` | String | Writer's descriptor as JSON |
//!
//! A non-unique `(world_name, saved_at)` index is created every time a
//! handle is (re)established. The duplicate check is read-then-write and
//! therefore advisory under concurrent writers.

use std::time::Duration;

use futures::TryStreamExt;
use mongodb::bson::{Bson, DateTime as BsonDateTime, Document, doc, to_bson};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, IndexModel};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use worldstore_core::{
    BatchConnector, Capabilities, Connector, ConnectorFailure, ConnectorState, ListOptions,
    LoadOptions, MongoSettings, OpResult, SaveOptions, ValidationPolicy,
};
use worldstore_types::{ConnectorType, Operation, RecordKey, StoredRecord, WorldData};

use crate::error::DbError;
use crate::memory::MemoryCollection;
use crate::order::world_label;

/// Seconds the driver waits to find a usable server before giving up.
const SERVER_SELECTION_TIMEOUT_SECS: u64 = 5;

/// Application name reported to the server.
const APP_NAME: &str = "worldstore";

/// Which snapshot a load resolves to.
#[derive(Debug)]
pub(crate) enum LoadQuery<'a> {
    /// Greatest `saved_at` across all worlds; ties go to the newest write.
    Latest,
    /// Exact identity lookup.
    Exact(RecordKey),
    /// Most recently written snapshot of one world and data type.
    NewestWrite {
        world_name: &'a str,
        data_type: &'a str,
    },
}

impl<'a> LoadQuery<'a> {
    /// Resolve the load mode from a source and its options.
    pub(crate) fn resolve(source: Option<&'a str>, options: &'a LoadOptions) -> Self {
        match (source, &options.saved_at) {
            (None, _) => Self::Latest,
            (Some(world_name), Some(saved_at)) => Self::Exact(RecordKey::new(
                world_name,
                saved_at.clone(),
                &options.data_type,
            )),
            (Some(world_name), None) => Self::NewestWrite {
                world_name,
                data_type: &options.data_type,
            },
        }
    }
}

/// A `MongoDB` collection acquired on first use.
#[derive(Debug)]
struct LazyCollection {
    settings: MongoSettings,
    handle: Mutex<Option<Collection<Document>>>,
}

impl LazyCollection {
    fn new(settings: MongoSettings) -> Self {
        Self {
            settings,
            handle: Mutex::new(None),
        }
    }

    /// Return the live collection, connecting first if there is none.
    async fn ensure(&self) -> Result<Collection<Document>, DbError> {
        let mut handle = self.handle.lock().await;
        if let Some(collection) = handle.as_ref() {
            return Ok(collection.clone());
        }

        let collection = open_collection(&self.settings).await?;
        info!(
            database = self.settings.database_name.as_str(),
            collection = self.settings.collection_name.as_str(),
            "Connected to MongoDB"
        );
        *handle = Some(collection.clone());
        Ok(collection)
    }
}

/// Connect, verify the server answers, and make sure the index exists.
async fn open_collection(settings: &MongoSettings) -> Result<Collection<Document>, DbError> {
    let mut options = ClientOptions::parse(&settings.connection_string)
        .await
        .map_err(|e| DbError::Unavailable(format!("invalid MongoDB connection string: {e}")))?;
    options.server_selection_timeout = Some(Duration::from_secs(SERVER_SELECTION_TIMEOUT_SECS));
    options.app_name = Some(APP_NAME.to_owned());

    let client = Client::with_options(options)
        .map_err(|e| DbError::Unavailable(format!("MongoDB client setup failed: {e}")))?;
    let database = client.database(&settings.database_name);
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| DbError::Unavailable(format!("MongoDB is not reachable: {e}")))?;

    let collection = database.collection::<Document>(&settings.collection_name);
    let index = IndexModel::builder()
        .keys(doc! { "world_name": 1, "saved_at": 1 })
        .build();
    if let Err(e) = collection.create_index(index).await {
        warn!(
            collection = settings.collection_name.as_str(),
            error = %e,
            "Failed to create world_name/saved_at index"
        );
    }
    Ok(collection)
}

/// Where a [`MongoConnector`] keeps its documents.
#[derive(Debug)]
enum DocumentStore {
    Server(LazyCollection),
    Memory(MemoryCollection),
}

impl DocumentStore {
    /// The ensure-connected step run at the top of every operation.
    async fn ensure(&self) -> Result<StoreHandle<'_>, DbError> {
        match self {
            Self::Server(lazy) => lazy.ensure().await.map(StoreHandle::Server),
            Self::Memory(memory) => memory.ping().map(|()| StoreHandle::Memory(memory)),
        }
    }
}

/// A live handle to the document store.
enum StoreHandle<'a> {
    Server(Collection<Document>),
    Memory(&'a MemoryCollection),
}

impl StoreHandle<'_> {
    async fn exists(&self, key: &RecordKey) -> Result<bool, DbError> {
        match self {
            Self::Server(coll) => Ok(coll.find_one(identity_filter(key)?).await?.is_some()),
            Self::Memory(memory) => Ok(memory.find(key)?.is_some()),
        }
    }

    async fn insert(&self, record: StoredRecord) -> Result<(), DbError> {
        match self {
            Self::Server(coll) => {
                coll.insert_one(record_document(&record)?).await?;
                Ok(())
            }
            Self::Memory(memory) => memory.insert(record),
        }
    }

    async fn refresh(&self, record: StoredRecord) -> Result<(), DbError> {
        match self {
            Self::Server(coll) => {
                let update = doc! {
                    "$set": {
                        "world_data_json": record.world_data_json.as_str(),
                        "connector_info": record.connector_info.as_str(),
                        "created_at": bson_time(&record),
                    }
                };
                coll.update_one(identity_filter(&record.key())?, update)
                    .await?;
                Ok(())
            }
            Self::Memory(memory) => memory.refresh(record).map(|_| ()),
        }
    }

    /// Stored payload text of the snapshot `query` resolves to.
    async fn load(&self, query: &LoadQuery<'_>) -> Result<Option<String>, DbError> {
        match self {
            Self::Server(coll) => {
                let found = match query {
                    LoadQuery::Latest => {
                        coll.find(doc! { "world_name": { "$exists": true } })
                            .sort(doc! { "saved_at": -1, "created_at": -1 })
                            .limit(1)
                            .await?
                            .try_next()
                            .await?
                    }
                    LoadQuery::Exact(key) => coll.find_one(identity_filter(key)?).await?,
                    LoadQuery::NewestWrite {
                        world_name,
                        data_type,
                    } => {
                        coll.find(doc! { "world_name": *world_name, "data_type": *data_type })
                            .sort(doc! { "created_at": -1, "_id": -1 })
                            .limit(1)
                            .await?
                            .try_next()
                            .await?
                    }
                };
                found.map(|d| payload_of(&d)).transpose()
            }
            Self::Memory(memory) => {
                let found = match query {
                    LoadQuery::Latest => memory.latest()?,
                    LoadQuery::Exact(key) => memory.find(key)?,
                    LoadQuery::NewestWrite {
                        world_name,
                        data_type,
                    } => memory.newest_write(world_name, data_type)?,
                };
                Ok(found.map(|record| record.world_data_json))
            }
        }
    }

    /// Latest `saved_at` of each world, most recent first.
    async fn latest_per_world(&self, limit: usize) -> Result<Vec<(String, Value)>, DbError> {
        match self {
            Self::Server(coll) => {
                if limit == 0 {
                    return Ok(Vec::new());
                }
                let pipeline = [
                    doc! { "$match": { "world_name": { "$exists": true } } },
                    doc! { "$sort": { "saved_at": -1, "created_at": -1 } },
                    doc! { "$group": { "_id": "$world_name", "saved_at": { "$first": "$saved_at" } } },
                    doc! { "$sort": { "saved_at": -1 } },
                    doc! { "$limit": i64::try_from(limit).unwrap_or(i64::MAX) },
                ];
                let mut cursor = coll.aggregate(pipeline).await?;
                let mut worlds = Vec::new();
                while let Some(group) = cursor.try_next().await? {
                    let name = group
                        .get_str("_id")
                        .map_err(|e| DbError::Corrupt(format!("world group without name: {e}")))?
                        .to_owned();
                    let saved_at = group
                        .get("saved_at")
                        .cloned()
                        .map_or(Value::Null, Bson::into_relaxed_extjson);
                    worlds.push((name, saved_at));
                }
                Ok(worlds)
            }
            Self::Memory(memory) => memory.latest_per_world(limit),
        }
    }

    async fn delete_world(&self, world_name: &str) -> Result<u64, DbError> {
        match self {
            Self::Server(coll) => Ok(coll
                .delete_many(doc! { "world_name": world_name })
                .await?
                .deleted_count),
            Self::Memory(memory) => memory.delete_world(world_name),
        }
    }
}

fn identity_filter(key: &RecordKey) -> Result<Document, DbError> {
    Ok(doc! {
        "world_name": key.world_name.as_str(),
        "saved_at": to_bson(&key.saved_at)?,
        "data_type": key.data_type.as_str(),
    })
}

fn record_document(record: &StoredRecord) -> Result<Document, DbError> {
    Ok(doc! {
        "record_id": record.id.to_string(),
        "world_name": record.world_name.as_str(),
        "saved_at": to_bson(&record.saved_at)?,
        "data_type": record.data_type.as_str(),
        "world_data_json": record.world_data_json.as_str(),
        "created_at": bson_time(record),
        "connector_info": record.connector_info.as_str(),
    })
}

fn bson_time(record: &StoredRecord) -> BsonDateTime {
    BsonDateTime::from_millis(record.created_at.timestamp_millis())
}

fn payload_of(document: &Document) -> Result<String, DbError> {
    document
        .get_str("world_data_json")
        .map(str::to_owned)
        .map_err(|e| DbError::Corrupt(format!("stored document has no payload: {e}")))
}

/// Batch connector over a `MongoDB` collection, or over an in-process
/// [`MemoryCollection`] with the same semantics.
#[derive(Debug)]
pub struct MongoConnector {
    state: ConnectorState,
    store: DocumentStore,
}

impl MongoConnector {
    /// Create a connector for the configured server. No I/O happens until
    /// the first operation.
    pub fn new(settings: MongoSettings) -> Self {
        Self {
            state: ConnectorState::new(
                &settings.name,
                "MongoDB database world data connector",
                ConnectorType::MongoDb,
            ),
            store: DocumentStore::Server(LazyCollection::new(settings)),
        }
    }

    /// Create a connector and try to reach the server right away.
    ///
    /// A failed attempt is logged and leaves the connector usable; the next
    /// operation retries.
    pub async fn connect(settings: MongoSettings) -> Self {
        let connector = Self::new(settings);
        if let Err(e) = connector.store.ensure().await {
            error!(
                connector = connector.name(),
                error = %e,
                "Failed to initialize MongoDB connection"
            );
        }
        connector
    }

    /// Create a connector backed by an in-process collection.
    pub fn in_memory(name: &str) -> Self {
        Self {
            state: ConnectorState::new(
                name,
                "In-memory document collection connector",
                ConnectorType::Memory,
            ),
            store: DocumentStore::Memory(MemoryCollection::new()),
        }
    }

    /// The in-process collection, when this connector uses one.
    pub const fn memory_collection(&self) -> Option<&MemoryCollection> {
        match &self.store {
            DocumentStore::Memory(memory) => Some(memory),
            DocumentStore::Server(_) => None,
        }
    }

    /// Calls received by the in-process collection. Always zero for a
    /// server-backed connector.
    pub fn backend_calls(&self) -> u64 {
        self.memory_collection()
            .map_or(0, MemoryCollection::backend_calls)
    }

    /// Take the in-process collection offline or back online. Has no effect
    /// on a server-backed connector.
    pub fn set_offline(&self, offline: bool) {
        if let Some(memory) = self.memory_collection() {
            memory.set_offline(offline);
        }
    }

    async fn try_save(
        &self,
        document: &Value,
        destination: Option<&str>,
        options: &SaveOptions,
    ) -> OpResult<()> {
        let data = ValidationPolicy::check(document)?;
        if let Some(destination) = destination {
            debug!(
                connector = self.name(),
                destination, "Destination ignored; collection is fixed per connector"
            );
        }

        let handle = self.store.ensure().await?;
        let key = RecordKey::for_document(&data, &options.data_type);
        let record = StoredRecord::new(&data, &options.data_type, &self.get_connector_info())
            .map_err(DbError::from)?;

        if handle.exists(&key).await? {
            if !options.replace_existing {
                return Err(ConnectorFailure::DuplicateIdentity(key));
            }
            handle.refresh(record).await?;
            debug!(connector = self.name(), record = %key, "Replaced world data");
        } else {
            handle.insert(record).await?;
            debug!(connector = self.name(), record = %key, "Saved world data");
        }
        Ok(())
    }

    async fn try_load(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        let handle = self.store.ensure().await?;
        let query = LoadQuery::resolve(source, options);
        let Some(payload) = handle.load(&query).await? else {
            debug!(connector = self.name(), ?source, "No world data found");
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&payload).map_err(DbError::from)?;
        Ok(ValidationPolicy::check_owned(value).ok())
    }

    async fn try_list(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        let handle = self.store.ensure().await?;
        let worlds = handle.latest_per_world(options.limit_or_default()).await?;
        Ok(worlds
            .into_iter()
            .map(|(name, saved_at)| world_label(&name, &saved_at))
            .collect())
    }

    async fn try_delete(&self, identifier: &str) -> OpResult<()> {
        let handle = self.store.ensure().await?;
        let deleted = handle.delete_world(identifier).await?;
        info!(
            connector = self.name(),
            world = identifier,
            deleted,
            "Deleted world data"
        );
        Ok(())
    }
}

impl Connector for MongoConnector {
    fn state(&self) -> &ConnectorState {
        &self.state
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE.with_batch()
    }

    async fn save_world_data(
        &self,
        document: &Value,
        destination: Option<&str>,
        options: &SaveOptions,
    ) -> OpResult<()> {
        let result = self.try_save(document, destination, options).await;
        self.state.finish(Operation::Save, result)
    }

    async fn load_world_data(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        let result = self.try_load(source, options).await;
        self.state.finish(Operation::Load, result)
    }

    async fn list_available_data(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        let result = self.try_list(options).await;
        self.state.finish(Operation::List, result)
    }

    async fn delete_data(&self, identifier: &str) -> OpResult<()> {
        let result = self.try_delete(identifier).await;
        self.state.finish(Operation::Delete, result)
    }
}

impl BatchConnector for MongoConnector {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use serde_json::json;
    use worldstore_types::OperationType;

    use super::*;

    #[test]
    fn load_query_modes() {
        let defaults = LoadOptions::default();
        assert!(matches!(LoadQuery::resolve(None, &defaults), LoadQuery::Latest));
        assert!(matches!(
            LoadQuery::resolve(Some("w1"), &defaults),
            LoadQuery::NewestWrite {
                world_name: "w1",
                data_type: "complete"
            }
        ));

        let exact = LoadOptions::default().at(json!("t1"));
        let LoadQuery::Exact(key) = LoadQuery::resolve(Some("w1"), &exact) else {
            panic!("explicit saved_at resolves to an exact lookup");
        };
        assert_eq!(key, RecordKey::new("w1", json!("t1"), "complete"));
    }

    #[test]
    fn record_document_has_identity_and_payload() {
        let data = WorldData::from_value(json!({"world_name": "w1", "saved_at": 3})).unwrap();
        let connector = MongoConnector::in_memory("m");
        let record = StoredRecord::new(&data, "complete", &connector.get_connector_info()).unwrap();
        let document = record_document(&record).unwrap();

        assert_eq!(document.get_str("world_name").unwrap(), "w1");
        assert_eq!(document.get_str("data_type").unwrap(), "complete");
        assert_eq!(payload_of(&document).unwrap(), record.world_data_json);
        assert!(document.get_datetime("created_at").is_ok());
    }

    #[test]
    fn server_connector_starts_without_io() {
        let connector = MongoConnector::new(MongoSettings::default());
        let info = connector.get_connector_info();
        assert_eq!(info.name, "MongoDB Database Connector");
        assert_eq!(info.connector_type, ConnectorType::MongoDb);
        assert_eq!(info.stats.operation_count, 0);
        assert!(connector.memory_collection().is_none());
        assert_eq!(connector.backend_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_save_is_refused_with_identity() {
        let connector = MongoConnector::in_memory("m");
        let doc = json!({"world_name": "w1", "saved_at": "t1", "x": 1});
        connector
            .save_world_data(&doc, None, &SaveOptions::default())
            .await
            .unwrap();

        let err = connector
            .save_world_data(&doc, None, &SaveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConnectorFailure::DuplicateIdentity(RecordKey::new("w1", json!("t1"), "complete"))
        );
        assert_eq!(
            connector
                .get_connector_info()
                .stats
                .last_operation
                .unwrap()
                .operation_type,
            OperationType::FailedSave
        );
    }

    #[tokio::test]
    async fn invalid_stored_payload_loads_as_absent() {
        let connector = MongoConnector::in_memory("m");
        let memory = connector.memory_collection().unwrap();
        let data = WorldData::from_value(json!({"world_name": "w1", "saved_at": 1})).unwrap();
        let mut record = StoredRecord::new(&data, "complete", &connector.get_connector_info()).unwrap();
        record.world_data_json = json!({"world_name": "w1"}).to_string();
        memory.insert(record).unwrap();

        let loaded = connector
            .load_world_data(Some("w1"), &LoadOptions::default())
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn data_types_are_separate_snapshots() {
        let connector = MongoConnector::in_memory("m");
        let doc = json!({"world_name": "w1", "saved_at": 1, "x": 1});
        connector
            .save_world_data(&doc, None, &SaveOptions::default())
            .await
            .unwrap();
        connector
            .save_world_data(
                &json!({"world_name": "w1", "saved_at": 1, "x": 2}),
                None,
                &SaveOptions::default().with_data_type("partial"),
            )
            .await
            .unwrap();

        let complete = connector
            .load_world_data(Some("w1"), &LoadOptions::default())
            .await
            .unwrap()
            .unwrap();
        let partial = connector
            .load_world_data(Some("w1"), &LoadOptions::default().with_data_type("partial"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(complete.get("x"), Some(&json!(1)));
        assert_eq!(partial.get("x"), Some(&json!(2)));
    }
}
