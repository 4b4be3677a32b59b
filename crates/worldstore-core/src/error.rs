//! Failure taxonomy for connector operations.
//!
//! Every connector operation returns an [`OpResult`]. Ordinary failures
//! (bad input, unreachable backend, duplicate snapshot, backend fault) are
//! values of [`ConnectorFailure`] and never panic or escape as anything
//! else. Calling an operation from a capability tier the connector does not
//! implement is reported separately as [`UnsupportedCapability`].

use worldstore_types::{RecordKey, ValidationError};

/// Result of a connector operation.
pub type OpResult<T> = Result<T, ConnectorFailure>;

/// Why a connector operation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorFailure {
    /// The document is not valid world data. No backend I/O was attempted.
    #[error("invalid world data: {0}")]
    Validation(#[from] ValidationError),

    /// A backend handle could not be established.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A snapshot with the same identity already exists and overwrite was
    /// not requested. The stored record is unchanged.
    #[error("record already exists for {0}")]
    DuplicateIdentity(RecordKey),

    /// Any other fault raised by the backend during I/O.
    #[error("backend operation failed: {0}")]
    Backend(String),

    /// A streaming call was made in the wrong session state, or the
    /// requested stream destination was rejected.
    #[error("stream session error: {0}")]
    StreamState(String),
}

impl ConnectorFailure {
    /// Failure for a push or stop attempted with no open session.
    pub fn not_streaming() -> Self {
        Self::StreamState(String::from(
            "no active stream session (call start_streaming first)",
        ))
    }

    /// Short label of the failure kind, for structured log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::DuplicateIdentity(_) => "duplicate_identity",
            Self::Backend(_) => "backend",
            Self::StreamState(_) => "stream_state",
        }
    }

    /// Whether this failure is a refusal of the caller's request rather
    /// than a fault in the backend.
    pub const fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::DuplicateIdentity(_) | Self::StreamState(_)
        )
    }
}

/// An optional capability tier on top of the base connector contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Ordered bulk save and load.
    Batch,
    /// Session-oriented live streaming.
    Streaming,
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Batch => f.write_str("batch"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

/// The capability tiers a connector implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Implements [`BatchConnector`](crate::BatchConnector).
    pub batch: bool,
    /// Implements [`StreamingConnector`](crate::StreamingConnector).
    pub streaming: bool,
}

impl Capabilities {
    /// Base contract only.
    pub const BASE: Self = Self {
        batch: false,
        streaming: false,
    };

    /// Add the batch tier.
    #[must_use]
    pub const fn with_batch(mut self) -> Self {
        self.batch = true;
        self
    }

    /// Add the streaming tier.
    #[must_use]
    pub const fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Whether `capability` is implemented.
    pub const fn supports(self, capability: Capability) -> bool {
        match capability {
            Capability::Batch => self.batch,
            Capability::Streaming => self.streaming,
        }
    }
}

/// An operation was invoked on a connector that does not implement its
/// capability tier. This is a programming error on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connector '{connector}' does not support {capability} operations")]
pub struct UnsupportedCapability {
    /// Name of the connector.
    pub connector: String,
    /// The missing capability.
    pub capability: Capability,
}
