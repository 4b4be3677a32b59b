//! Type-erased connector.
//!
//! [`AnyConnector`] lets a registry hold connectors of every backend behind
//! one type. The base contract is forwarded as is. Batch and streaming
//! calls are checked against the wrapped connector's capabilities and fail
//! with [`UnsupportedCapability`] when the tier is missing, without
//! touching the connector.

use serde_json::Value;
use worldstore_core::{
    BatchConnector, Capabilities, Capability, Connector, ConnectorState, ListOptions, LoadOptions,
    OpResult, SaveOptions, StreamingConnector, UnsupportedCapability,
};
use worldstore_types::WorldData;

use crate::dragonfly::DragonflyConnector;
use crate::file::FileConnector;
use crate::mongo::MongoConnector;
use crate::postgres::PostgresConnector;

/// A connector of any supported backend.
#[derive(Debug)]
pub enum AnyConnector {
    /// `MongoDB` collection or its in-process stand-in.
    Mongo(MongoConnector),
    /// `PostgreSQL` table.
    Postgres(PostgresConnector),
    /// Local directory of JSON files.
    File(FileConnector),
    /// `Dragonfly` hashes and pub/sub.
    Dragonfly(DragonflyConnector),
}

impl AnyConnector {
    /// Whether the wrapped connector implements `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().supports(capability)
    }

    fn unsupported(&self, capability: Capability) -> UnsupportedCapability {
        UnsupportedCapability {
            connector: self.name().to_owned(),
            capability,
        }
    }

    /// Batch save, if the wrapped connector supports it.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCapability`] for connectors without the batch
    /// tier.
    pub async fn save_batch(
        &self,
        documents: &[Value],
        destination_prefix: Option<&str>,
        options: &SaveOptions,
    ) -> Result<Vec<OpResult<()>>, UnsupportedCapability> {
        match self {
            Self::Mongo(c) => Ok(c.save_batch(documents, destination_prefix, options).await),
            Self::Postgres(c) => Ok(c.save_batch(documents, destination_prefix, options).await),
            Self::File(c) => Ok(c.save_batch(documents, destination_prefix, options).await),
            Self::Dragonfly(_) => Err(self.unsupported(Capability::Batch)),
        }
    }

    /// Batch load, if the wrapped connector supports it.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCapability`] for connectors without the batch
    /// tier.
    pub async fn load_batch<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        options: &LoadOptions,
    ) -> Result<Vec<OpResult<Option<WorldData>>>, UnsupportedCapability> {
        match self {
            Self::Mongo(c) => Ok(c.load_batch(identifiers, options).await),
            Self::Postgres(c) => Ok(c.load_batch(identifiers, options).await),
            Self::File(c) => Ok(c.load_batch(identifiers, options).await),
            Self::Dragonfly(_) => Err(self.unsupported(Capability::Batch)),
        }
    }

    /// Open a streaming session, if the wrapped connector supports it.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCapability`] for connectors without the
    /// streaming tier.
    pub async fn start_streaming(
        &self,
        destination: Option<&str>,
    ) -> Result<OpResult<()>, UnsupportedCapability> {
        match self {
            Self::File(c) => Ok(c.start_streaming(destination).await),
            Self::Dragonfly(c) => Ok(c.start_streaming(destination).await),
            Self::Mongo(_) | Self::Postgres(_) => Err(self.unsupported(Capability::Streaming)),
        }
    }

    /// Push one update, if the wrapped connector supports streaming.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCapability`] for connectors without the
    /// streaming tier.
    pub async fn stream_world_data(
        &self,
        document: &Value,
    ) -> Result<OpResult<()>, UnsupportedCapability> {
        match self {
            Self::File(c) => Ok(c.stream_world_data(document).await),
            Self::Dragonfly(c) => Ok(c.stream_world_data(document).await),
            Self::Mongo(_) | Self::Postgres(_) => Err(self.unsupported(Capability::Streaming)),
        }
    }

    /// Close the streaming session, if the wrapped connector supports it.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCapability`] for connectors without the
    /// streaming tier.
    pub async fn stop_streaming(&self) -> Result<OpResult<()>, UnsupportedCapability> {
        match self {
            Self::File(c) => Ok(c.stop_streaming().await),
            Self::Dragonfly(c) => Ok(c.stop_streaming().await),
            Self::Mongo(_) | Self::Postgres(_) => Err(self.unsupported(Capability::Streaming)),
        }
    }

    /// Whether a streaming session is open. Always `false` for connectors
    /// without the streaming tier.
    pub async fn is_streaming(&self) -> bool {
        match self {
            Self::File(c) => c.is_streaming().await,
            Self::Dragonfly(c) => c.is_streaming().await,
            Self::Mongo(_) | Self::Postgres(_) => false,
        }
    }
}

impl Connector for AnyConnector {
    fn state(&self) -> &ConnectorState {
        match self {
            Self::Mongo(c) => c.state(),
            Self::Postgres(c) => c.state(),
            Self::File(c) => c.state(),
            Self::Dragonfly(c) => c.state(),
        }
    }

    fn capabilities(&self) -> Capabilities {
        match self {
            Self::Mongo(c) => c.capabilities(),
            Self::Postgres(c) => c.capabilities(),
            Self::File(c) => c.capabilities(),
            Self::Dragonfly(c) => c.capabilities(),
        }
    }

    async fn save_world_data(
        &self,
        document: &Value,
        destination: Option<&str>,
        options: &SaveOptions,
    ) -> OpResult<()> {
        match self {
            Self::Mongo(c) => c.save_world_data(document, destination, options).await,
            Self::Postgres(c) => c.save_world_data(document, destination, options).await,
            Self::File(c) => c.save_world_data(document, destination, options).await,
            Self::Dragonfly(c) => c.save_world_data(document, destination, options).await,
        }
    }

    async fn load_world_data(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>> {
        match self {
            Self::Mongo(c) => c.load_world_data(source, options).await,
            Self::Postgres(c) => c.load_world_data(source, options).await,
            Self::File(c) => c.load_world_data(source, options).await,
            Self::Dragonfly(c) => c.load_world_data(source, options).await,
        }
    }

    async fn list_available_data(&self, options: &ListOptions) -> OpResult<Vec<String>> {
        match self {
            Self::Mongo(c) => c.list_available_data(options).await,
            Self::Postgres(c) => c.list_available_data(options).await,
            Self::File(c) => c.list_available_data(options).await,
            Self::Dragonfly(c) => c.list_available_data(options).await,
        }
    }

    async fn delete_data(&self, identifier: &str) -> OpResult<()> {
        match self {
            Self::Mongo(c) => c.delete_data(identifier).await,
            Self::Postgres(c) => c.delete_data(identifier).await,
            Self::File(c) => c.delete_data(identifier).await,
            Self::Dragonfly(c) => c.delete_data(identifier).await,
        }
    }
}

impl From<MongoConnector> for AnyConnector {
    fn from(connector: MongoConnector) -> Self {
        Self::Mongo(connector)
    }
}

impl From<PostgresConnector> for AnyConnector {
    fn from(connector: PostgresConnector) -> Self {
        Self::Postgres(connector)
    }
}

impl From<FileConnector> for AnyConnector {
    fn from(connector: FileConnector) -> Self {
        Self::File(connector)
    }
}

impl From<DragonflyConnector> for AnyConnector {
    fn from(connector: DragonflyConnector) -> Self {
        Self::Dragonfly(connector)
    }
}
