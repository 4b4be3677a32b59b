//! Configuration loading and typed config structures for worldstore.
//!
//! A configuration file lists the connector instances to build, each tagged
//! with its backend `type`, plus logging settings. Connection strings can be
//! overridden from the environment so deployments do not need to edit YAML:
//!
//! - `MONGODB_URI` overrides `connection_string` of every `mongodb` connector
//! - `DATABASE_URL` overrides `url` of every `postgres` connector
//! - `DRAGONFLY_URL` overrides `url` of every `dragonfly` connector

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use worldstore_types::ConnectorType;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an unusable setup.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Connector instances, in declaration order.
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

impl StoreConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment overrides,
    /// and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override connection strings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override connection strings using `lookup` as the variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mongo = lookup("MONGODB_URI");
        let postgres = lookup("DATABASE_URL");
        let dragonfly = lookup("DRAGONFLY_URL");

        for connector in &mut self.connectors {
            match connector {
                ConnectorConfig::Mongodb(settings) => {
                    if let Some(val) = &mongo {
                        settings.connection_string.clone_from(val);
                    }
                }
                ConnectorConfig::Postgres(settings) => {
                    if let Some(val) = &postgres {
                        settings.url.clone_from(val);
                    }
                }
                ConnectorConfig::Dragonfly(settings) => {
                    if let Some(val) = &dragonfly {
                        settings.url.clone_from(val);
                    }
                }
                ConnectorConfig::Memory(_) | ConnectorConfig::File(_) => {}
            }
        }
    }

    /// Reject empty or duplicate connector names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending connector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for connector in &self.connectors {
            let name = connector.name();
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "a {} connector has an empty name",
                    connector.connector_type()
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "connector name '{name}' is declared more than once"
                )));
            }
        }
        Ok(())
    }
}

/// One connector instance, tagged by backend type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectorConfig {
    /// Document database connector.
    Mongodb(MongoSettings),
    /// In-process document collection.
    Memory(MemorySettings),
    /// `PostgreSQL` connector.
    Postgres(PostgresSettings),
    /// Local directory connector.
    File(FileSettings),
    /// Dragonfly (Redis-compatible) connector.
    Dragonfly(DragonflySettings),
}

impl ConnectorConfig {
    /// Configured connector name.
    pub fn name(&self) -> &str {
        match self {
            Self::Mongodb(s) => &s.name,
            Self::Memory(s) => &s.name,
            Self::Postgres(s) => &s.name,
            Self::File(s) => &s.name,
            Self::Dragonfly(s) => &s.name,
        }
    }

    /// Backend discriminator of the connector this builds.
    pub const fn connector_type(&self) -> ConnectorType {
        match self {
            Self::Mongodb(_) => ConnectorType::MongoDb,
            Self::Memory(_) => ConnectorType::Memory,
            Self::Postgres(_) => ConnectorType::Postgres,
            Self::File(_) => ConnectorType::File,
            Self::Dragonfly(_) => ConnectorType::Dragonfly,
        }
    }
}

/// Document database connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MongoSettings {
    /// Connector name.
    #[serde(default = "default_mongo_name")]
    pub name: String,

    /// Connection URI.
    #[serde(default = "default_mongo_uri")]
    pub connection_string: String,

    /// Database holding the collection.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Collection holding one document per snapshot.
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            name: default_mongo_name(),
            connection_string: default_mongo_uri(),
            database_name: default_database_name(),
            collection_name: default_collection_name(),
        }
    }
}

/// In-process document collection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemorySettings {
    /// Connector name.
    #[serde(default = "default_memory_name")]
    pub name: String,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            name: default_memory_name(),
        }
    }
}

/// `PostgreSQL` connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostgresSettings {
    /// Connector name.
    #[serde(default = "default_postgres_name")]
    pub name: String,

    /// `PostgreSQL` connection string.
    #[serde(default = "default_postgres_url")]
    pub url: String,

    /// Table holding one row per snapshot. Must be a plain identifier.
    #[serde(default = "default_table")]
    pub table: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait when acquiring a connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds an idle connection is kept open.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            name: default_postgres_name(),
            url: default_postgres_url(),
            table: default_table(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Local directory connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileSettings {
    /// Connector name.
    #[serde(default = "default_file_name")]
    pub name: String,

    /// Root directory for snapshots and streams.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            name: default_file_name(),
            directory: default_directory(),
        }
    }
}

/// Dragonfly connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DragonflySettings {
    /// Connector name.
    #[serde(default = "default_dragonfly_name")]
    pub name: String,

    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub url: String,

    /// Prefix for every key and channel this connector touches.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for DragonflySettings {
    fn default() -> Self {
        Self {
            name: default_dragonfly_name(),
            url: default_dragonfly_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde's `default = "..."` attribute)
// ---------------------------------------------------------------------------

fn default_mongo_name() -> String {
    "MongoDB Database Connector".to_owned()
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017/".to_owned()
}

fn default_database_name() -> String {
    "worldstore".to_owned()
}

fn default_collection_name() -> String {
    "world_data".to_owned()
}

fn default_memory_name() -> String {
    "In-Memory Document Connector".to_owned()
}

fn default_postgres_name() -> String {
    "PostgreSQL Connector".to_owned()
}

fn default_postgres_url() -> String {
    "postgresql://localhost:5432/worldstore".to_owned()
}

fn default_table() -> String {
    "world_snapshots".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

const fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_file_name() -> String {
    "File Connector".to_owned()
}

fn default_directory() -> PathBuf {
    PathBuf::from("world-data")
}

fn default_dragonfly_name() -> String {
    "Dragonfly Connector".to_owned()
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_key_prefix() -> String {
    "worldstore".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    const FULL_YAML: &str = r"
logging:
  level: debug
connectors:
  - type: mongodb
    name: primary
    connection_string: mongodb://db:27017/
    database_name: sim
    collection_name: worlds
  - type: postgres
    name: archive
    url: postgresql://pg:5432/sim
    table: snapshots
  - type: file
    name: local
    directory: ./data
  - type: dragonfly
    name: live
    url: redis://cache:6379
    key_prefix: sim
  - type: memory
    name: scratch
";

    #[test]
    fn parse_full_yaml() {
        let config: StoreConfig = serde_yml::from_str(FULL_YAML).unwrap();
        config.validate().unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.connectors.len(), 5);

        let ConnectorConfig::Mongodb(mongo) = &config.connectors[0] else {
            panic!("expected mongodb connector");
        };
        assert_eq!(mongo.connection_string, "mongodb://db:27017/");
        assert_eq!(mongo.database_name, "sim");
        assert_eq!(mongo.collection_name, "worlds");

        let ConnectorConfig::Postgres(pg) = &config.connectors[1] else {
            panic!("expected postgres connector");
        };
        assert_eq!(pg.table, "snapshots");
        assert_eq!(pg.max_connections, 10);

        assert_eq!(config.connectors[2].connector_type(), ConnectorType::File);
        assert_eq!(config.connectors[3].name(), "live");
        assert_eq!(config.connectors[4].connector_type(), ConnectorType::Memory);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: StoreConfig = serde_yml::from_str("connectors:\n  - type: mongodb\n").unwrap();
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(
            config.connectors[0],
            ConnectorConfig::Mongodb(MongoSettings::default())
        );
        assert_eq!(config.connectors[0].name(), "MongoDB Database Connector");
    }

    #[test]
    fn empty_document_is_an_empty_config() {
        let config: StoreConfig = serde_yml::from_str("{}").unwrap();
        assert!(config.connectors.is_empty());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_yml::from_str::<StoreConfig>("connectors:\n  - type: sqlite\n");
        assert!(result.is_err());
    }

    #[test]
    fn overrides_replace_connection_strings_by_type() {
        let mut config: StoreConfig = serde_yml::from_str(FULL_YAML).unwrap();
        config.apply_overrides_from(|key| match key {
            "MONGODB_URI" => Some(String::from("mongodb://override:27017/")),
            "DRAGONFLY_URL" => Some(String::from("redis://override:6379")),
            _ => None,
        });

        let ConnectorConfig::Mongodb(mongo) = &config.connectors[0] else {
            panic!("expected mongodb connector");
        };
        assert_eq!(mongo.connection_string, "mongodb://override:27017/");
        let ConnectorConfig::Postgres(pg) = &config.connectors[1] else {
            panic!("expected postgres connector");
        };
        assert_eq!(pg.url, "postgresql://pg:5432/sim");
        let ConnectorConfig::Dragonfly(df) = &config.connectors[3] else {
            panic!("expected dragonfly connector");
        };
        assert_eq!(df.url, "redis://override:6379");
    }

    #[test]
    fn duplicate_names_are_invalid() {
        let config: StoreConfig = serde_yml::from_str(
            "connectors:\n  - type: memory\n    name: a\n  - type: file\n    name: a\n",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn empty_names_are_invalid() {
        let config: StoreConfig =
            serde_yml::from_str("connectors:\n  - type: memory\n    name: \"  \"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = StoreConfig::from_file(Path::new("/nonexistent/worldstore.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
