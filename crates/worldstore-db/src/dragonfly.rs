//! `Dragonfly` (Redis-compatible) connector.
//!
//! Snapshots live in one hash per world; streaming publishes to a pub/sub
//! channel. Inserts use `HSETNX`, so duplicate detection is atomic.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{prefix}:worlds` | Set | Every world with at least one snapshot |
//! | `{prefix}:world:{world}` | Hash | `{data_type}\|{saved_at json}` -> stored record JSON |
//! | `{prefix}:stream:{destination}` | Channel | Streamed updates |

use std::collections::HashMap;
use std::time::Duration;

use fred::prelude::*;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};
use worldstore_core::{
    Capabilities, Connector, ConnectorFailure, ConnectorState, DragonflySettings, ListOptions,
    LoadOptions, OpResult, SaveOptions, StreamSession, StreamingConnector, ValidationPolicy,
};
use worldstore_types::{ConnectorType, Operation, RecordKey, StoredRecord, WorldData};

use crate::error::DbError;
use crate::mongo::LoadQuery;
use crate::order::{by_saved_at, by_write_time, latest_per_world, world_label};

/// Seconds to wait for a connection before giving up.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Key names derived from the configured prefix.
#[derive(Debug, Clone)]
struct Keys {
    prefix: String,
}

impl Keys {
    /// Set of world names.
    fn worlds(&self) -> String {
        format!("{}:worlds", self.prefix)
    }

    /// Hash of one world's snapshots.
    fn world(&self, world_name: &str) -> String {
        format!("{}:world:{world_name}", self.prefix)
    }

    /// Pub/sub channel of a stream destination.
    fn stream(&self, destination: &str) -> String {
        format!("{}:stream:{destination}", self.prefix)
    }

    /// Hash field of one snapshot within its world.
    fn field(key: &RecordKey) -> String {
        format!("{}|{}", key.data_type, key.saved_at)
    }
}

/// Reject stream destinations that would not form a single channel name.
fn check_stream_destination(destination: &str) -> Result<(), ConnectorFailure> {
    if destination.is_empty() || destination.contains(char::is_whitespace) {
        return Err(ConnectorFailure::StreamState(format!(
            "stream destination '{destination}' must be non-empty without whitespace"
        )));
    }
    Ok(())
}

fn decode_records(fields: HashMap<String, String>) -> Result<Vec<StoredRecord>, DbError> {
    fields
        .into_values()
        .map(|json| serde_json::from_str(&json).map_err(DbError::from))
        .collect()
}

/// Streaming connector over `Dragonfly`.
///
/// Not a batch connector: bulk work is left to the caller.
#[derive(Debug)]
pub struct DragonflyConnector {
    state: ConnectorState,
    url: String,
    keys: Keys,
    client: Mutex<Option<Client>>,
    session: StreamSession<String>,
}

impl DragonflyConnector {
    /// Create a connector for the configured server. No I/O happens until
    /// the first operation.
    pub fn new(settings: DragonflySettings) -> Self {
        Self {
            state: ConnectorState::new(
                &settings.name,
                "Dragonfly world data connector",
                ConnectorType::Dragonfly,
            ),
            url: settings.url,
            keys: Keys {
                prefix: settings.key_prefix,
            },
            client: Mutex::new(None),
            session: StreamSession::new(),
        }
    }

    /// Return a connected client, reconnecting if the stored one is gone.
    async fn ensure(&self) -> Result<Client, DbError> {
        let mut handle = self.client.lock().await;
        if let Some(client) = handle.as_ref().filter(|client| client.is_connected()) {
            return Ok(client.clone());
        }
        if let Some(stale) = handle.take() {
            debug!(connector = self.name(), "Dragonfly connection lost, reconnecting");
            if let Err(e) = stale.quit().await {
                debug!(
                    connector = self.name(),
                    error = %e,
                    "Stale Dragonfly client did not quit cleanly"
                );
            }
        }

        let config = Config::from_url(&self.url)
            .map_err(|e| DbError::Unavailable(format!("Invalid Dragonfly URL: {e}")))?;
        let client = Builder::from_config(config)
            .with_connection_config(|connection| {
                connection.connection_timeout = Duration::from_secs(CONNECT_TIMEOUT_SECS);
            })
            .build()
            .map_err(|e| DbError::Unavailable(format!("Dragonfly client setup failed: {e}")))?;
        client
            .init()
            .await
            .map_err(|e| DbError::Unavailable(format!("Dragonfly is not reachable: {e}")))?;

        info!(connector = self.name(), "Connected to Dragonfly");
        *handle = Some(client.clone());
        Ok(client)
    }

    async fn world_records(
        &self,
        client: &Client,
        world_name: &str,
    ) -> Result<Vec<StoredRecord>, DbError> {
        let fields: HashMap<String, String> = client.hgetall(self.keys.world(world_name)).await?;
        decode_records(fields)
    }

    async fn all_records(&self, client: &Client) -> Result<Vec<StoredRecord>, DbError> {
        let worlds: Vec<String> = client.smembers(self.keys.worlds()).await?;
        let mut records = Vec::new();
        for world in &worlds {
            records.extend(self.world_records(client, world).await?);
        }
        Ok(records)
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
                destination, "Destination ignored; keys are fixed per connector"
            );
        }

        let client = self.ensure().await?;
        let mut record = StoredRecord::new(&data, &options.data_type, &self.get_connector_info())
            .map_err(DbError::from)?;
        let key = record.key();
        let hash = self.keys.world(&key.world_name);
        let field = Keys::field(&key);

        if options.replace_existing {
            let existing: Option<String> = client
                .hget(&hash, &field)
                .await
                .map_err(DbError::from)?;
            if let Some(json) = existing {
                let mut stored: StoredRecord =
                    serde_json::from_str(&json).map_err(DbError::from)?;
                stored.refresh_from(record);
                record = stored;
            }
            let json = serde_json::to_string(&record).map_err(DbError::from)?;
            let _: i64 = client
                .hset(&hash, (field.as_str(), json.as_str()))
                .await
                .map_err(DbError::from)?;
        } else {
            let json = serde_json::to_string(&record).map_err(DbError::from)?;
            let inserted: bool = client
                .hsetnx(&hash, &field, json.as_str())
                .await
                .map_err(DbError::from)?;
            if !inserted {
                return Err(ConnectorFailure::DuplicateIdentity(key));
            }
        }

        let _: i64 = client
            .sadd(self.keys.worlds(), key.world_name.as_str())
            .await
            .map_err(DbError::from)?;
        debug!(connector = self.name(), record = %key, "Saved world data");
        Ok(())
    }

    async fn try_load(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        let client = self.ensure().await?;
        let found = match LoadQuery::resolve(source, options) {
            LoadQuery::Latest => self.all_records(&client).await?.into_iter().max_by(by_saved_at),
            LoadQuery::Exact(key) => {
                let json: Option<String> = client
                    .hget(self.keys.world(&key.world_name), Keys::field(&key))
                    .await
                    .map_err(DbError::from)?;
                json.map(|j| serde_json::from_str::<StoredRecord>(&j))
                    .transpose()
                    .map_err(DbError::from)?
            }
            LoadQuery::NewestWrite {
                world_name,
                data_type,
            } => self
                .world_records(&client, world_name)
                .await?
                .into_iter()
                .filter(|r| r.data_type == data_type)
                .max_by(by_write_time),
        };

        let Some(record) = found else {
            debug!(connector = self.name(), ?source, "No world data found");
            return Ok(None);
        };
        let value = record.payload().map_err(DbError::from)?;
        Ok(ValidationPolicy::check_owned(value).ok())
    }

    async fn try_list(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        let client = self.ensure().await?;
        let records = self.all_records(&client).await?;
        Ok(latest_per_world(records, options.limit_or_default())
            .iter()
            .map(|(name, saved_at)| world_label(name, saved_at))
            .collect())
    }

    async fn try_delete(&self, identifier: &str) -> OpResult<()> {
        let client = self.ensure().await?;
        let deleted: i64 = client
            .del(self.keys.world(identifier))
            .await
            .map_err(DbError::from)?;
        let _: i64 = client
            .srem(self.keys.worlds(), identifier)
            .await
            .map_err(DbError::from)?;
        info!(
            connector = self.name(),
            world = identifier,
            deleted,
            "Deleted world data"
        );
        Ok(())
    }

    async fn try_start(&self, destination: Option<&str>) -> OpResult<()> {
        self.session
            .start(destination, |destination| async move {
                check_stream_destination(&destination)?;
                self.ensure().await?;
                Ok(self.keys.stream(&destination))
            })
            .await
    }

    async fn try_stream(&self, document: &Value) -> OpResult<()> {
        let mut session = self.session.lock().await;
        let Some(active) = session.as_mut() else {
            return Err(ConnectorFailure::not_streaming());
        };
        let data = ValidationPolicy::check(document)?;

        let client = self.ensure().await?;
        let update = active.next_update(data);
        let message = serde_json::to_string(&update).map_err(DbError::from)?;
        let receivers: i64 = client
            .publish(active.sink.as_str(), message.as_str())
            .await
            .map_err(DbError::from)?;
        active.mark_pushed();
        debug!(
            connector = self.name(),
            channel = active.sink.as_str(),
            sequence = update.sequence,
            receivers,
            "Published world data"
        );
        Ok(())
    }
}

impl Connector for DragonflyConnector {
    fn state(&self) -> &ConnectorState {
        &self.state
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE.with_streaming()
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

/// Each push is one `PUBLISH`; it is acknowledged once the server accepts
/// the message. Having no subscribers is not a failure.
impl StreamingConnector for DragonflyConnector {
    async fn start_streaming(&self, destination: Option<&str>) -> OpResult<()> {
        let result = self.try_start(destination).await;
        self.state.finish(Operation::StartStreaming, result)
    }

    async fn stream_world_data(&self, document: &Value) -> OpResult<()> {
        let result = self.try_stream(document).await;
        self.state.finish(Operation::Stream, result)
    }

    async fn stop_streaming(&self) -> OpResult<()> {
        self.session.take().await;
        self.state.finish(Operation::StopStreaming, Ok(()))
    }

    async fn is_streaming(&self) -> bool {
        self.session.is_active().await
    }
}
