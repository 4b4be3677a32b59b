//! Connector contracts for persisting world data.
//!
//! A connector saves and loads world data snapshots against some external
//! store. This crate defines what every connector must honor, independent
//! of the backend behind it:
//!
//! ```text
//! caller
//!   |
//!   +-- save_world_data --> ValidationPolicy --> backend I/O --+
//!   +-- load / list / delete ---------------> backend I/O --+
//!                                                            |
//!                        ConnectorState (stats, logging) <---+
//! ```
//!
//! # Modules
//!
//! - [`connector`] -- [`Connector`], [`BatchConnector`], [`StreamingConnector`]
//! - [`validation`] -- [`ValidationPolicy`], the mandatory save gate
//! - [`state`] -- [`ConnectorState`]: identity plus operation statistics
//! - [`streaming`] -- [`StreamSession`], the single-writer session machine
//! - [`options`] -- Per-operation options (`data_type`, overwrite, limits)
//! - [`error`] -- [`ConnectorFailure`] taxonomy and capability errors
//! - [`config`] -- YAML configuration for connector instances

pub mod config;
pub mod connector;
pub mod error;
pub mod options;
pub mod state;
pub mod streaming;
pub mod validation;

// Re-export primary types for convenience.
pub use config::{
    ConfigError, ConnectorConfig, DragonflySettings, FileSettings, LoggingConfig, MemorySettings,
    MongoSettings, PostgresSettings, StoreConfig,
};
pub use connector::{BatchConnector, Connector, StreamingConnector};
pub use error::{Capabilities, Capability, ConnectorFailure, OpResult, UnsupportedCapability};
pub use options::{DEFAULT_LIST_LIMIT, ListOptions, LoadOptions, SaveOptions};
pub use state::ConnectorState;
pub use streaming::{ActiveStream, DEFAULT_STREAM_DESTINATION, StreamSession, StreamUpdate};
pub use validation::ValidationPolicy;
