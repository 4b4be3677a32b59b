//! Connector backends for worldstore.
//!
//! Every backend implements the base [`Connector`](worldstore_core::Connector)
//! contract; batch and streaming tiers are added where the backend has a
//! natural way to provide them.
//!
//! # Backends
//!
//! ```text
//!                      Connector  Batch  Streaming
//! MongoConnector           x        x
//!   (in_memory)            x        x
//! PostgresConnector        x        x
//! FileConnector            x        x        x
//! DragonflyConnector       x                 x
//! ```
//!
//! Backend handles are acquired lazily on the first operation and
//! re-established after a failure. A connector never panics on backend
//! trouble; it returns `BackendUnavailable` or `Backend` failures instead.
//!
//! # Modules
//!
//! - [`mongo`] -- `MongoDB` collection connector
//! - [`memory`] -- In-process collection used by [`MongoConnector::in_memory`]
//! - [`postgres`] -- `PostgreSQL` table connector
//! - [`file`] -- JSON files on disk, JSONL streams
//! - [`dragonfly`] -- `Dragonfly` hashes and pub/sub streams
//! - [`any`] -- [`AnyConnector`], dispatch over every backend
//! - [`registry`] -- [`ConnectorRegistry`], named instances built from config
//! - [`error`] -- Shared error types

pub mod any;
pub mod dragonfly;
pub mod error;
pub mod file;
pub mod memory;
pub mod mongo;
mod order;
pub mod postgres;
pub mod registry;

// Re-export primary types for convenience.
pub use any::AnyConnector;
pub use dragonfly::DragonflyConnector;
pub use error::DbError;
pub use file::FileConnector;
pub use memory::MemoryCollection;
pub use mongo::MongoConnector;
pub use postgres::PostgresConnector;
pub use registry::{ConnectorRegistry, RegistryError};
