//! Per-operation options.
//!
//! Each option set has defaults matching the contract: snapshots are saved
//! and loaded as `"complete"`, duplicates are refused rather than
//! overwritten, and listings are capped at [`DEFAULT_LIST_LIMIT`] worlds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use worldstore_types::DEFAULT_DATA_TYPE;

/// Number of worlds returned by a listing when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Options for `save_world_data` and `save_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Snapshot variant the document is stored as.
    #[serde(default = "default_data_type")]
    pub data_type: String,
    /// Overwrite an existing snapshot with the same identity.
    #[serde(default)]
    pub replace_existing: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            data_type: default_data_type(),
            replace_existing: false,
        }
    }
}

impl SaveOptions {
    /// Overwrite an existing snapshot instead of refusing the save.
    #[must_use]
    pub const fn replacing(mut self) -> Self {
        self.replace_existing = true;
        self
    }

    /// Store the document under a different `data_type`.
    #[must_use]
    pub fn with_data_type(mut self, data_type: &str) -> Self {
        data_type.clone_into(&mut self.data_type);
        self
    }
}

/// Options for `load_world_data` and `load_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Snapshot variant to load when a source is given.
    #[serde(default = "default_data_type")]
    pub data_type: String,
    /// Exact snapshot token to load when a source is given.
    #[serde(default)]
    pub saved_at: Option<Value>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            data_type: default_data_type(),
            saved_at: None,
        }
    }
}

impl LoadOptions {
    /// Load the snapshot with exactly this `saved_at`.
    #[must_use]
    pub fn at(mut self, saved_at: Value) -> Self {
        self.saved_at = Some(saved_at);
        self
    }

    /// Load a different `data_type`.
    #[must_use]
    pub fn with_data_type(mut self, data_type: &str) -> Self {
        data_type.clone_into(&mut self.data_type);
        self
    }
}

/// Options for `list_available_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Maximum number of worlds to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListOptions {
    /// Cap the listing at `limit` worlds.
    pub const fn limited(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    /// The effective limit.
    pub fn limit_or_default(self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

fn default_data_type() -> String {
    DEFAULT_DATA_TYPE.to_owned()
}
