//! Single-writer streaming session state.
//!
//! A [`StreamSession`] is either idle or holds one [`ActiveStream`] wrapping
//! a backend-specific sink. Opening, pushing, and closing all go through the
//! same async mutex, so at most one session exists per connector and pushes
//! are serialized.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;
use worldstore_types::WorldData;

use crate::error::{ConnectorFailure, OpResult};

/// Destination used when `start_streaming` is called without one.
pub const DEFAULT_STREAM_DESTINATION: &str = "default";

/// An open streaming session.
#[derive(Debug)]
pub struct ActiveStream<S> {
    /// Where updates are delivered.
    pub destination: String,
    /// When the session was opened.
    pub started_at: DateTime<Utc>,
    /// Number of updates accepted so far.
    pub pushed: u64,
    /// Backend-specific output handle.
    pub sink: S,
}

impl<S> ActiveStream<S> {
    /// Wrap `world_data` as the next update of this session.
    ///
    /// The sequence number only advances once [`mark_pushed`] confirms
    /// delivery.
    ///
    /// [`mark_pushed`]: Self::mark_pushed
    pub fn next_update(&self, world_data: WorldData) -> StreamUpdate {
        StreamUpdate {
            destination: self.destination.clone(),
            sequence: self.pushed.saturating_add(1),
            streamed_at: Utc::now(),
            world_data,
        }
    }

    /// Count one accepted update.
    pub const fn mark_pushed(&mut self) {
        self.pushed = self.pushed.saturating_add(1);
    }
}

/// One update as delivered to a stream sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpdate {
    /// Session destination.
    pub destination: String,
    /// Position within the session, starting at 1.
    pub sequence: u64,
    /// When the update was produced.
    pub streamed_at: DateTime<Utc>,
    /// The streamed document.
    pub world_data: WorldData,
}

/// The `idle → streaming → idle` state machine.
#[derive(Debug)]
pub struct StreamSession<S> {
    active: Mutex<Option<ActiveStream<S>>>,
}

impl<S> Default for StreamSession<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StreamSession<S> {
    /// An idle session.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// Open a session on `destination`, building the sink with `open`.
    ///
    /// The sink is only opened when no session is active; the session stays
    /// idle if `open` fails.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorFailure::StreamState`] if a session is already
    /// open, or whatever `open` returns.
    pub async fn start<F, Fut>(&self, destination: Option<&str>, open: F) -> OpResult<()>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = OpResult<S>>,
    {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(ConnectorFailure::StreamState(format!(
                "a stream session to '{}' is already active",
                current.destination
            )));
        }

        let destination = destination.unwrap_or(DEFAULT_STREAM_DESTINATION).to_owned();
        let sink = open(destination.clone()).await?;
        info!(destination = destination.as_str(), "stream session started");
        *active = Some(ActiveStream {
            destination,
            started_at: Utc::now(),
            pushed: 0,
            sink,
        });
        Ok(())
    }

    /// Lock the session for a push. The guard holds `None` while idle.
    pub async fn lock(&self) -> MutexGuard<'_, Option<ActiveStream<S>>> {
        self.active.lock().await
    }

    /// Close the session, returning it if one was open.
    pub async fn take(&self) -> Option<ActiveStream<S>> {
        let closed = self.active.lock().await.take();
        if let Some(stream) = &closed {
            info!(
                destination = stream.destination.as_str(),
                pushed = stream.pushed,
                "stream session stopped"
            );
        }
        closed
    }

    /// Whether a session is open.
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }
}
