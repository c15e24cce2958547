//! Incremental reply stream protocol
//!
//! While a reply is being generated, partial text is pushed to viewers over
//! one logical stream per correlation identifier. The hub holds a broadcast
//! sender per in-flight generation; publishing to an identifier nobody is
//! watching is fine, and subscribing to a finished identifier yields nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

/// Prefix for locally-derived correlation identifiers
pub const STREAM_ID_PREFIX: &str = "gen-";

/// Buffered events per subscription before a slow viewer starts lagging
const STREAM_BUFFER: usize = 64;

/// One partial-text update for an in-flight reply
///
/// `text` is cumulative, not a delta. `done` marks the final event of the
/// stream; no further events follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEvent {
    pub correlation_id: String,
    pub text: String,
    pub done: bool,
}

impl ReplyEvent {
    #[must_use]
    pub fn partial(correlation_id: &str, text: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            text: text.to_string(),
            done: false,
        }
    }

    #[must_use]
    pub fn complete(correlation_id: &str, text: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            text: text.to_string(),
            done: true,
        }
    }
}

/// Derive the correlation identifier for the reply to an incoming message
#[must_use]
pub fn correlation_id_for(incoming_message_id: &str) -> String {
    format!("{STREAM_ID_PREFIX}{incoming_message_id}")
}

/// Registry of per-correlation-id broadcast channels for in-flight replies
#[derive(Default)]
pub struct StreamHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ReplyEvent>>>,
}

impl StreamHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream for a generation that is about to start.
    /// Idempotent; re-opening an active identifier keeps the existing channel.
    pub async fn open(&self, correlation_id: &str) {
        let mut channels = self.channels.write().await;
        channels
            .entry(correlation_id.to_string())
            .or_insert_with(|| broadcast::channel(STREAM_BUFFER).0);
    }

    /// Subscribe to an in-flight stream. `None` when the identifier is
    /// unknown or already finished - late viewers wait for the next snapshot.
    pub async fn subscribe(&self, correlation_id: &str) -> Option<broadcast::Receiver<ReplyEvent>> {
        let channels = self.channels.read().await;
        channels.get(correlation_id).map(broadcast::Sender::subscribe)
    }

    /// Publish an event to a stream. A `done` event closes the stream and
    /// drops the channel. Events for unknown identifiers are discarded.
    pub async fn publish(&self, event: ReplyEvent) {
        let done = event.done;
        let id = event.correlation_id.clone();
        {
            let channels = self.channels.read().await;
            if let Some(tx) = channels.get(&id) {
                // Send fails when no viewer is subscribed; that's fine
                drop(tx.send(event));
            } else {
                tracing::debug!(correlation_id = %id, "dropping event for unknown stream");
                return;
            }
        }
        if done {
            self.channels.write().await.remove(&id);
        }
    }

    /// Number of in-flight streams (diagnostics)
    pub async fn active_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Number of viewers subscribed to a stream (diagnostics)
    pub async fn subscriber_count(&self, correlation_id: &str) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(correlation_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
