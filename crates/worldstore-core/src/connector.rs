//! The connector contracts.
//!
//! One core trait plus two optional capability tiers:
//!
//! - [`Connector`] -- save, load, list, delete. Every backend implements it.
//! - [`BatchConnector`] -- ordered bulk save/load, by default composed from
//!   the single-item operations.
//! - [`StreamingConnector`] -- a start → push → stop session over a live
//!   outbound channel.
//!
//! All operations take `&self` and return an [`OpResult`]. Implementations
//! catch backend faults, route the outcome through
//! [`ConnectorState::finish`], and never panic. Callers holding a
//! type-erased connector query capabilities before using batch or
//! streaming operations.

use serde_json::Value;
use tracing::debug;
use worldstore_types::{ConnectorDescriptor, WorldData};

use crate::error::{Capabilities, OpResult};
use crate::options::{ListOptions, LoadOptions, SaveOptions};
use crate::state::ConnectorState;

/// Base contract every backend implements.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// Identity and statistics owned by this connector.
    fn state(&self) -> &ConnectorState;

    /// Capability tiers implemented on top of the base contract.
    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE
    }

    /// Connector name.
    fn name(&self) -> &str {
        self.state().name()
    }

    /// Fresh snapshot of identity, metadata, and statistics.
    fn get_connector_info(&self) -> ConnectorDescriptor {
        self.state().descriptor()
    }

    /// Save one document.
    ///
    /// Runs the validation policy before any I/O. `destination` is a
    /// backend-specific routing hint; `None` means the connector's default
    /// location. Succeeds only on a confirmed write. A duplicate identity
    /// without `replace_existing` is refused.
    async fn save_world_data(
        &self,
        document: &Value,
        destination: Option<&str>,
        options: &SaveOptions,
    ) -> OpResult<()>;

    /// Load one document.
    ///
    /// With no `source`, returns the snapshot with the greatest `saved_at`
    /// across all worlds. `Ok(None)` means nothing matched.
    async fn load_world_data(
        &self,
        source: Option<&str>,
        options: &LoadOptions,
    ) -> OpResult<Option<WorldData>>;

    /// Human-readable identifiers of available data, most recent first.
    async fn list_available_data(&self, options: &ListOptions) -> OpResult<Vec<String>>;

    /// Delete data addressed by `identifier`. Matching nothing is a success.
    async fn delete_data(&self, identifier: &str) -> OpResult<()>;
}

/// Ordered bulk operations.
///
/// The defaults apply the single-item operation to every element in order.
/// Each slot of the output corresponds to the same slot of the input, and
/// one element's failure does not affect its siblings. Backends overriding
/// these with a native bulk call must keep both properties.
#[allow(async_fn_in_trait)]
pub trait BatchConnector: Connector {
    /// Save every document; one result per input, in input order.
    async fn save_batch(
        &self,
        documents: &[Value],
        destination_prefix: Option<&str>,
        options: &SaveOptions,
    ) -> Vec<OpResult<()>> {
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            results.push(
                self.save_world_data(document, destination_prefix, options)
                    .await,
            );
        }
        debug!(
            connector = self.name(),
            total = results.len(),
            saved = results.iter().filter(|r| r.is_ok()).count(),
            "batch save finished"
        );
        results
    }

    /// Load every identifier; one slot per input, in input order.
    async fn load_batch<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        options: &LoadOptions,
    ) -> Vec<OpResult<Option<WorldData>>> {
        let mut results = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            results.push(
                self.load_world_data(Some(identifier.as_ref()), options)
                    .await,
            );
        }
        results
    }
}

/// Session-oriented streaming: `idle → streaming → idle`.
///
/// Sessions are single-writer. Delivery and acknowledgement semantics are
/// backend-specific and documented on each implementation.
#[allow(async_fn_in_trait)]
pub trait StreamingConnector: Connector {
    /// Open a session. Fails if one is already open or the backend rejects
    /// `destination`.
    async fn start_streaming(&self, destination: Option<&str>) -> OpResult<()>;

    /// Push one update into the open session. Fails while idle.
    async fn stream_world_data(&self, document: &Value) -> OpResult<()>;

    /// Close the session. Closing an idle connector succeeds.
    async fn stop_streaming(&self) -> OpResult<()>;

    /// Whether a session is open.
    async fn is_streaming(&self) -> bool;
}
