//! Named connector instances.
//!
//! A [`ConnectorRegistry`] owns every connector an application uses and
//! hands them out by name. It is usually built once from a
//! [`StoreConfig`]; connectors are created without I/O and reach their
//! backends on first use.

use std::collections::BTreeMap;

use tracing::info;
use worldstore_core::{Connector, ConnectorConfig, StoreConfig};
use worldstore_types::ConnectorDescriptor;

use crate::any::AnyConnector;
use crate::dragonfly::DragonflyConnector;
use crate::error::DbError;
use crate::file::FileConnector;
use crate::mongo::MongoConnector;
use crate::postgres::PostgresConnector;

/// Errors raised while assembling a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A connector with this name is already registered.
    #[error("connector '{0}' is already registered")]
    DuplicateName(String),

    /// A connector could not be built from its settings.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Connectors keyed by their unique name.
#[derive(Debug, Default)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<String, AnyConnector>,
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every connector named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if two connectors share a name or a
    /// connector's settings are unusable.
    pub fn from_config(config: &StoreConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for entry in &config.connectors {
            registry.register(build(entry)?)?;
        }
        info!(
            connectors = registry.connectors.len(),
            "Connector registry ready"
        );
        Ok(registry)
    }

    /// Add a connector under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken; the
    /// registered connector is kept.
    pub fn register(&mut self, connector: impl Into<AnyConnector>) -> Result<(), RegistryError> {
        let connector = connector.into();
        let name = connector.name().to_owned();
        if self.connectors.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        info!(
            connector = name.as_str(),
            connector_type = %connector.state().connector_type(),
            "Registered connector"
        );
        self.connectors.insert(name, connector);
        Ok(())
    }

    /// Look up a connector by name.
    pub fn get(&self, name: &str) -> Option<&AnyConnector> {
        self.connectors.get(name)
    }

    /// Look up a connector by name for exclusive use.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AnyConnector> {
        self.connectors.get_mut(name)
    }

    /// Remove and return a connector.
    pub fn remove(&mut self, name: &str) -> Option<AnyConnector> {
        self.connectors.remove(name)
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }

    /// Number of registered connectors.
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Iterate over connectors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AnyConnector> {
        self.connectors.values()
    }

    /// Fresh descriptors of every connector, in name order.
    pub fn describe_all(&self) -> Vec<ConnectorDescriptor> {
        self.iter().map(Connector::get_connector_info).collect()
    }
}

fn build(entry: &ConnectorConfig) -> Result<AnyConnector, DbError> {
    Ok(match entry {
        ConnectorConfig::Mongodb(settings) => MongoConnector::new(settings.clone()).into(),
        ConnectorConfig::Memory(settings) => MongoConnector::in_memory(&settings.name).into(),
        ConnectorConfig::Postgres(settings) => PostgresConnector::new(settings.clone())?.into(),
        ConnectorConfig::File(settings) => FileConnector::new(settings.clone()).into(),
        ConnectorConfig::Dragonfly(settings) => DragonflyConnector::new(settings.clone()).into(),
    })
}
