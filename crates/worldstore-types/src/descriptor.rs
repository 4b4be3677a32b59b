//! Connector identity and operation statistics.
//!
//! Every connector instance reports a [`ConnectorDescriptor`]: who it is,
//! what kind of backend sits behind it, and a running record of what it
//! last did. The statistics half ([`OperationStats`]) is owned and mutated
//! by the connector alone and is updated on every call, including calls
//! that fail, so it reflects attempted rather than successful activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Backend discriminator reported by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConnectorType {
    /// `MongoDB` document collection.
    #[serde(rename = "mongodb")]
    MongoDb,
    /// In-process document collection.
    Memory,
    /// `PostgreSQL` table.
    Postgres,
    /// Local directory of JSON files.
    File,
    /// `Dragonfly` (Redis-compatible) hashes and pub/sub.
    Dragonfly,
}

impl ConnectorType {
    /// Wire name of this connector type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MongoDb => "mongodb",
            Self::Memory => "memory",
            Self::Postgres => "postgres",
            Self::File => "file",
            Self::Dragonfly => "dragonfly",
        }
    }
}

impl core::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connector operation, independent of its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Operation {
    /// `save_world_data`.
    Save,
    /// `load_world_data`.
    Load,
    /// `list_available_data`.
    List,
    /// `delete_data`.
    Delete,
    /// `start_streaming`.
    StartStreaming,
    /// `stream_world_data`.
    Stream,
    /// `stop_streaming`.
    StopStreaming,
}

impl Operation {
    /// Name used in logs and operation labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Load => "load",
            Self::List => "list",
            Self::Delete => "delete",
            Self::StartStreaming => "start_streaming",
            Self::Stream => "stream",
            Self::StopStreaming => "stop_streaming",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` stamped on the last operation: the operation itself, or its
/// distinguished `failed_` counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OperationType {
    /// Successful save.
    Save,
    /// Successful load (including "nothing found").
    Load,
    /// Successful listing.
    List,
    /// Successful delete.
    Delete,
    /// Stream session opened.
    StartStreaming,
    /// Update pushed to the open stream.
    Stream,
    /// Stream session closed (or already closed).
    StopStreaming,
    /// Failed save.
    FailedSave,
    /// Failed load.
    FailedLoad,
    /// Failed listing.
    FailedList,
    /// Failed delete.
    FailedDelete,
    /// Stream session could not be opened.
    FailedStartStreaming,
    /// Update could not be pushed.
    FailedStream,
    /// Stream session could not be closed cleanly.
    FailedStopStreaming,
}

impl OperationType {
    /// Stamp for `operation` with the given outcome.
    pub const fn new(operation: Operation, failed: bool) -> Self {
        match (operation, failed) {
            (Operation::Save, false) => Self::Save,
            (Operation::Load, false) => Self::Load,
            (Operation::List, false) => Self::List,
            (Operation::Delete, false) => Self::Delete,
            (Operation::StartStreaming, false) => Self::StartStreaming,
            (Operation::Stream, false) => Self::Stream,
            (Operation::StopStreaming, false) => Self::StopStreaming,
            (Operation::Save, true) => Self::FailedSave,
            (Operation::Load, true) => Self::FailedLoad,
            (Operation::List, true) => Self::FailedList,
            (Operation::Delete, true) => Self::FailedDelete,
            (Operation::StartStreaming, true) => Self::FailedStartStreaming,
            (Operation::Stream, true) => Self::FailedStream,
            (Operation::StopStreaming, true) => Self::FailedStopStreaming,
        }
    }

    /// The operation this stamp refers to.
    pub const fn operation(self) -> Operation {
        match self {
            Self::Save | Self::FailedSave => Operation::Save,
            Self::Load | Self::FailedLoad => Operation::Load,
            Self::List | Self::FailedList => Operation::List,
            Self::Delete | Self::FailedDelete => Operation::Delete,
            Self::StartStreaming | Self::FailedStartStreaming => Operation::StartStreaming,
            Self::Stream | Self::FailedStream => Operation::Stream,
            Self::StopStreaming | Self::FailedStopStreaming => Operation::StopStreaming,
        }
    }

    /// Whether this stamp marks a failed attempt.
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::FailedSave
                | Self::FailedLoad
                | Self::FailedList
                | Self::FailedDelete
                | Self::FailedStartStreaming
                | Self::FailedStream
                | Self::FailedStopStreaming
        )
    }
}

/// The most recent operation a connector attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LastOperation {
    /// Operation and outcome.
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
}

/// Running statistics for one connector instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OperationStats {
    /// Last attempted operation, if any.
    pub last_operation: Option<LastOperation>,
    /// Number of attempted operations, successful or not.
    pub operation_count: u64,
}

impl OperationStats {
    /// Record an attempted operation finishing at `at`.
    pub fn record(&mut self, operation: Operation, failed: bool, at: DateTime<Utc>) {
        self.last_operation = Some(LastOperation {
            operation_type: OperationType::new(operation, failed),
            timestamp: at,
        });
        self.operation_count = self.operation_count.saturating_add(1);
    }
}

/// Identity, metadata, and statistics of a connector instance.
///
/// A snapshot computed fresh from the connector's current state on every
/// call to `get_connector_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConnectorDescriptor {
    /// Unique name within a registry.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Backend discriminator.
    pub connector_type: ConnectorType,
    /// When the connector instance was created.
    pub created_at: DateTime<Utc>,
    /// Operation statistics, flattened into the descriptor.
    #[serde(flatten)]
    pub stats: OperationStats,
}
