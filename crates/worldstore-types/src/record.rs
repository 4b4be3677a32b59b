//! Backend-neutral stored records.
//!
//! A [`StoredRecord`] is what a backend keeps for one saved snapshot: the
//! original document serialized as an opaque payload, the identity fields
//! pulled out for indexing, a `data_type` discriminator so partial and
//! incremental variants can coexist with complete snapshots, and a copy of
//! the writing connector's descriptor for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::descriptor::ConnectorDescriptor;
use crate::world_data::{WorldData, saved_at_label};

/// `data_type` used when the caller does not select one.
pub const DEFAULT_DATA_TYPE: &str = "complete";

/// Identity of a stored snapshot: `(world_name, saved_at, data_type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    /// World the snapshot belongs to.
    pub world_name: String,
    /// Snapshot token.
    pub saved_at: Value,
    /// Snapshot variant.
    pub data_type: String,
}

impl RecordKey {
    /// Build a key from its parts.
    pub fn new(world_name: &str, saved_at: Value, data_type: &str) -> Self {
        Self {
            world_name: world_name.to_owned(),
            saved_at,
            data_type: data_type.to_owned(),
        }
    }

    /// Key under which `document` is stored as `data_type`.
    pub fn for_document(document: &WorldData, data_type: &str) -> Self {
        Self::new(&document.world_key(), document.saved_at().clone(), data_type)
    }

    /// Whether `record` carries this identity.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        record.world_name == self.world_name
            && record.saved_at == self.saved_at
            && record.data_type == self.data_type
    }
}

impl core::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} at {} ({})",
            self.world_name,
            saved_at_label(&self.saved_at),
            self.data_type
        )
    }
}

/// A persisted snapshot as held by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Backend-assigned identifier (UUID v7, time-ordered).
    pub id: Uuid,
    /// Indexed copy of `world_name`.
    pub world_name: String,
    /// Indexed copy of `saved_at`.
    pub saved_at: Value,
    /// Snapshot variant.
    pub data_type: String,
    /// The original document, serialized.
    pub world_data_json: String,
    /// When the record was written (refreshed on replace).
    pub created_at: DateTime<Utc>,
    /// Descriptor of the writing connector at write time, serialized.
    pub connector_info: String,
}

impl StoredRecord {
    /// Wrap `document` for storage under `data_type`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if the document or the
    /// descriptor cannot be serialized.
    pub fn new(
        document: &WorldData,
        data_type: &str,
        descriptor: &ConnectorDescriptor,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::now_v7(),
            world_name: document.world_key(),
            saved_at: document.saved_at().clone(),
            data_type: data_type.to_owned(),
            world_data_json: document.to_json()?,
            created_at: Utc::now(),
            connector_info: serde_json::to_string(descriptor)?,
        })
    }

    /// Identity key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.world_name, self.saved_at.clone(), &self.data_type)
    }

    /// Overwrite payload and metadata with those of `newer`.
    ///
    /// Identity fields and the record id are left untouched.
    pub fn refresh_from(&mut self, newer: Self) {
        self.world_data_json = newer.world_data_json;
        self.connector_info = newer.connector_info;
        self.created_at = newer.created_at;
    }

    /// Decode the stored payload back into JSON.
    ///
    /// The result is not validated; callers run it through the validation
    /// policy before returning it.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if the payload is not
    /// valid JSON.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.world_data_json)
    }

    /// Listing label for this record's world.
    pub fn label(&self) -> String {
        format!(
            "{} (latest: {})",
            self.world_name,
            saved_at_label(&self.saved_at)
        )
    }
}
