//! Connector identity and operation bookkeeping.
//!
//! [`ConnectorState`] is embedded in every concrete connector. It owns the
//! identity half of the descriptor and the mutable [`OperationStats`], and
//! it is the single place where operation outcomes are logged and counted:
//! backends route every result through [`ConnectorState::finish`].

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use worldstore_types::{ConnectorDescriptor, ConnectorType, Operation, OperationStats};

use crate::error::{ConnectorFailure, OpResult};

/// Identity plus running statistics of one connector instance.
#[derive(Debug)]
pub struct ConnectorState {
    name: String,
    description: String,
    connector_type: ConnectorType,
    created_at: DateTime<Utc>,
    stats: Mutex<OperationStats>,
}

impl ConnectorState {
    /// Create state for a new connector instance.
    pub fn new(name: &str, description: &str, connector_type: ConnectorType) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            connector_type,
            created_at: Utc::now(),
            stats: Mutex::new(OperationStats::default()),
        }
    }

    /// Connector name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend discriminator.
    pub const fn connector_type(&self) -> ConnectorType {
        self.connector_type
    }

    /// Current statistics.
    pub fn stats(&self) -> OperationStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh descriptor snapshot.
    pub fn descriptor(&self) -> ConnectorDescriptor {
        ConnectorDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            connector_type: self.connector_type,
            created_at: self.created_at,
            stats: self.stats(),
        }
    }

    /// Count an attempted operation.
    pub fn record(&self, operation: Operation, failed: bool) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(operation, failed, Utc::now());
    }

    /// Log and count the outcome of `operation`, passing `result` through.
    pub fn finish<T>(&self, operation: Operation, result: OpResult<T>) -> OpResult<T> {
        match &result {
            Ok(_) => self.record(operation, false),
            Err(failure) => {
                self.log_failure(operation, failure);
                self.record(operation, true);
            }
        }
        result
    }

    fn log_failure(&self, operation: Operation, failure: &ConnectorFailure) {
        if failure.is_refusal() {
            warn!(
                connector = self.name.as_str(),
                operation = operation.as_str(),
                kind = failure.kind(),
                error = %failure,
                "connector operation refused"
            );
        } else {
            error!(
                connector = self.name.as_str(),
                operation = operation.as_str(),
                kind = failure.kind(),
                error = %failure,
                "connector operation failed"
            );
        }
    }
}
