//! `PostgreSQL` snapshot connector.
//!
//! One row per snapshot in a configurable table. `saved_at` and the payload
//! are `jsonb`, so any JSON `saved_at` token can be stored and ordered.
//! Identity is enforced by a `UNIQUE (world_name, saved_at, data_type)`
//! constraint and every write is a single `INSERT .. ON CONFLICT`, which
//! makes duplicate detection atomic.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! to avoid requiring a live database at build time. All values are bound
//! as parameters; the table name is validated as a plain identifier before
//! it is spliced into SQL.

use std::time::Duration;

use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use worldstore_core::{
    BatchConnector, Capabilities, Connector, ConnectorFailure, ConnectorState, ListOptions,
    LoadOptions, OpResult, PostgresSettings, SaveOptions, ValidationPolicy,
};
use worldstore_types::{ConnectorType, Operation, RecordKey, StoredRecord, WorldData};

use crate::error::DbError;
use crate::mongo::LoadQuery;
use crate::order::world_label;

/// Longest identifier `PostgreSQL` accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `name` can be used unquoted as a table name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQL statements for one snapshot table.
#[derive(Debug)]
struct Statements {
    create_table: String,
    create_index: String,
    insert: String,
    upsert: String,
    latest: String,
    exact: String,
    newest_write: String,
    list: String,
    delete: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        let columns = "id, world_name, saved_at, data_type, world_data, created_at, connector_info";
        let values = "$1, $2, $3, $4, $5, $6, $7";
        Self {
            create_table: format!(
                r"CREATE TABLE IF NOT EXISTS {table} (
                    id UUID PRIMARY KEY,
                    world_name TEXT NOT NULL,
                    saved_at JSONB NOT NULL,
                    data_type TEXT NOT NULL DEFAULT 'complete',
                    world_data JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    connector_info TEXT NOT NULL,
                    UNIQUE (world_name, saved_at, data_type)
                )"
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {table}_world_saved_idx ON {table} (world_name, saved_at)"
            ),
            insert: format!(
                r"INSERT INTO {table} ({columns}) VALUES ({values})
                  ON CONFLICT (world_name, saved_at, data_type) DO NOTHING
                  RETURNING id"
            ),
            upsert: format!(
                r"INSERT INTO {table} ({columns}) VALUES ({values})
                  ON CONFLICT (world_name, saved_at, data_type) DO UPDATE SET
                    world_data = EXCLUDED.world_data,
                    connector_info = EXCLUDED.connector_info,
                    created_at = EXCLUDED.created_at
                  RETURNING id"
            ),
            latest: format!(
                "SELECT world_data FROM {table} ORDER BY saved_at DESC, created_at DESC LIMIT 1"
            ),
            exact: format!(
                r"SELECT world_data FROM {table}
                  WHERE world_name = $1 AND saved_at = $2 AND data_type = $3"
            ),
            newest_write: format!(
                r"SELECT world_data FROM {table}
                  WHERE world_name = $1 AND data_type = $2
                  ORDER BY created_at DESC, id DESC
                  LIMIT 1"
            ),
            list: format!(
                r"SELECT world_name, saved_at FROM (
                    SELECT DISTINCT ON (world_name) world_name, saved_at, created_at
                    FROM {table}
                    ORDER BY world_name, saved_at DESC, created_at DESC
                  ) latest
                  ORDER BY saved_at DESC, created_at DESC
                  LIMIT $1"
            ),
            delete: format!("DELETE FROM {table} WHERE world_name = $1"),
        }
    }
}

/// Batch connector over a `PostgreSQL` table.
#[derive(Debug)]
pub struct PostgresConnector {
    state: ConnectorState,
    settings: PostgresSettings,
    sql: Box<Statements>,
    pool: Mutex<Option<PgPool>>,
}

impl PostgresConnector {
    /// Create a connector for the configured database. No I/O happens until
    /// the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the table name is not a plain
    /// identifier.
    pub fn new(settings: PostgresSettings) -> Result<Self, DbError> {
        if !is_identifier(&settings.table) {
            return Err(DbError::Config(format!(
                "table name '{}' is not a valid identifier",
                settings.table
            )));
        }
        Ok(Self {
            state: ConnectorState::new(
                &settings.name,
                "PostgreSQL world data connector",
                ConnectorType::Postgres,
            ),
            sql: Box::new(Statements::for_table(&settings.table)),
            settings,
            pool: Mutex::new(None),
        })
    }

    /// Close the pool if one is open. The next operation reconnects.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
            info!(connector = self.name(), "PostgreSQL pool closed");
        }
    }

    /// Return the live pool, connecting and creating the table first if
    /// there is none.
    async fn ensure(&self) -> Result<PgPool, DbError> {
        let mut handle = self.pool.lock().await;
        if let Some(pool) = handle.as_ref() {
            return Ok(pool.clone());
        }

        let connect_options: PgConnectOptions = self
            .settings
            .url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Unavailable(format!("invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(Duration::from_secs(self.settings.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.settings.idle_timeout_secs))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::Unavailable(format!("PostgreSQL is not reachable: {e}")))?;

        sqlx::query(&self.sql.create_table).execute(&pool).await?;
        if let Err(e) = sqlx::query(&self.sql.create_index).execute(&pool).await {
            warn!(
                table = self.settings.table.as_str(),
                error = %e,
                "Failed to create world_name/saved_at index"
            );
        }

        info!(
            connector = self.name(),
            table = self.settings.table.as_str(),
            max_connections = self.settings.max_connections,
            "Connected to PostgreSQL"
        );
        *handle = Some(pool.clone());
        Ok(pool)
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
                destination, "Destination ignored; table is fixed per connector"
            );
        }

        let pool = self.ensure().await?;
        let record = StoredRecord::new(&data, &options.data_type, &self.get_connector_info())
            .map_err(DbError::from)?;
        let key = record.key();
        let payload = record.payload().map_err(DbError::from)?;
        let statement = if options.replace_existing {
            &self.sql.upsert
        } else {
            &self.sql.insert
        };

        let written = sqlx::query_scalar::<_, uuid::Uuid>(statement)
            .bind(record.id)
            .bind(&record.world_name)
            .bind(&record.saved_at)
            .bind(&record.data_type)
            .bind(&payload)
            .bind(record.created_at)
            .bind(&record.connector_info)
            .fetch_optional(&pool)
            .await
            .map_err(DbError::from)?;

        if written.is_none() {
            return Err(ConnectorFailure::DuplicateIdentity(key));
        }
        debug!(connector = self.name(), record = %key, "Saved world data");
        Ok(())
    }

    async fn try_load(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        let pool = self.ensure().await?;
        let found: Option<Value> = match LoadQuery::resolve(source, options) {
            LoadQuery::Latest => {
                sqlx::query_scalar::<_, Value>(&self.sql.latest)
                    .fetch_optional(&pool)
                    .await
            }
            LoadQuery::Exact(RecordKey {
                world_name,
                saved_at,
                data_type,
            }) => {
                sqlx::query_scalar::<_, Value>(&self.sql.exact)
                    .bind(world_name)
                    .bind(saved_at)
                    .bind(data_type)
                    .fetch_optional(&pool)
                    .await
            }
            LoadQuery::NewestWrite {
                world_name,
                data_type,
            } => {
                sqlx::query_scalar::<_, Value>(&self.sql.newest_write)
                    .bind(world_name)
                    .bind(data_type)
                    .fetch_optional(&pool)
                    .await
            }
        }
        .map_err(DbError::from)?;

        let Some(value) = found else {
            debug!(connector = self.name(), ?source, "No world data found");
            return Ok(None);
        };
        Ok(ValidationPolicy::check_owned(value).ok())
    }

    async fn try_list(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        let pool = self.ensure().await?;
        let limit = i64::try_from(options.limit_or_default()).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, (String, Value)>(&self.sql.list)
            .bind(limit)
            .fetch_all(&pool)
            .await
            .map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|(name, saved_at)| world_label(&name, &saved_at))
            .collect())
    }

    async fn try_delete(&self, identifier: &str) -> OpResult<()> {
        let pool = self.ensure().await?;
        let deleted = sqlx::query(&self.sql.delete)
            .bind(identifier)
            .execute(&pool)
            .await
            .map_err(DbError::from)?
            .rows_affected();
        info!(
            connector = self.name(),
            world = identifier,
            deleted,
            "Deleted world data"
        );
        Ok(())
    }
}

impl Connector for PostgresConnector {
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

impl BatchConnector for PostgresConnector {}
