//! Shared type definitions for the worldstore connector framework.
//!
//! This crate is the single source of truth for the persistence data model:
//! the world data document handed to connectors, the record a backend keeps
//! for it, and the descriptor a connector reports about itself. Descriptor
//! types flow downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`world_data`] -- Validated world data documents and `saved_at` ordering
//! - [`record`] -- Backend-neutral stored record and its identity key
//! - [`descriptor`] -- Connector identity, operation types, and statistics

pub mod descriptor;
pub mod record;
pub mod world_data;

// Re-export all public types at crate root for convenience.
pub use descriptor::{
    ConnectorDescriptor, ConnectorType, LastOperation, Operation, OperationStats, OperationType,
};
pub use record::{DEFAULT_DATA_TYPE, RecordKey, StoredRecord};
pub use world_data::{
    REQUIRED_FIELDS, ValidationError, WorldData, compare_saved_at, saved_at_label, world_key_of,
};
