//! Bounded in-memory message store
//!
//! The store is the single source of truth for the conversation. It keeps two
//! independent bounded sequences (incoming and outgoing), each newest-first.
//! Eviction is FIFO by insertion order, so clock skew between entries can
//! never grow a sequence past its cap.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum messages retained per direction
pub const STORE_CAP: usize = 1000;

/// Message direction relative to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from a user via the messaging gateway
    Incoming,
    /// Sent by the bot
    Outgoing,
}

/// Generation state of an outgoing reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Body is final
    Complete,
    /// Body is still being generated incrementally
    InProgress,
}

/// A single stored message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within its direction sequence. Provider-assigned where
    /// available, otherwise generated locally.
    pub id: String,

    pub direction: Direction,

    /// Raw gateway address (e.g. `whatsapp:+14155551234`), kept for dispatch
    pub counterparty: String,

    /// Counterparty with the transport prefix stripped, for display
    pub counterparty_display: String,

    /// Sender profile name, present on incoming messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    pub body: String,

    /// Assigned when the message is accepted into the store; all ordering
    /// uses this, never the external event time
    pub created_at: DateTime<Utc>,

    /// Immediate status string from the gateway ack (outgoing only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<String>,

    /// Only meaningful for generated outgoing replies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_state: Option<GenerationState>,

    /// Links an in-flight incremental generation to this message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Message {
    /// Build an incoming message. `created_at` is assigned here, at the
    /// moment of acceptance.
    #[must_use]
    pub fn incoming(id: String, from: String, display_name: Option<String>, body: String) -> Self {
        let counterparty_display = crate::channels::display_address(&from);
        Self {
            id,
            direction: Direction::Incoming,
            counterparty: from,
            counterparty_display,
            display_name,
            body,
            created_at: Utc::now(),
            delivery_status: None,
            generation_state: None,
            correlation_id: None,
        }
    }

    /// Build an outgoing message
    #[must_use]
    pub fn outgoing(id: String, to: String, body: String, state: GenerationState) -> Self {
        let counterparty_display = crate::channels::display_address(&to);
        Self {
            id,
            direction: Direction::Outgoing,
            counterparty: to,
            counterparty_display,
            display_name: None,
            body,
            created_at: Utc::now(),
            delivery_status: None,
            generation_state: Some(state),
            correlation_id: None,
        }
    }

    /// Attach a correlation identifier
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Attach the gateway's immediate delivery status
    #[must_use]
    pub fn with_delivery_status(mut self, status: String) -> Self {
        self.delivery_status = Some(status);
        self
    }

    /// Whether this is an outgoing reply whose generation has not finished
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.direction == Direction::Outgoing
            && self.generation_state == Some(GenerationState::InProgress)
    }
}

/// Per-direction message counts, reported with snapshots
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MessageCounts {
    pub incoming: usize,
    pub outgoing: usize,
    pub total: usize,
}

#[derive(Default)]
struct Inner {
    /// Newest-first
    incoming: VecDeque<Message>,
    /// Newest-first
    outgoing: VecDeque<Message>,
}

/// Bounded, append-biased record of all messages
///
/// All operations lock the store for their full duration, so concurrent
/// webhook handlers cannot interleave within a single append or update.
#[derive(Default)]
pub struct MessageStore {
    inner: Mutex<Inner>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head of the message's direction sequence, evicting the
    /// tail once the cap is exceeded. Always succeeds; visible immediately.
    pub fn append(&self, message: Message) {
        let mut inner = self.lock();
        let queue = match message.direction {
            Direction::Incoming => &mut inner.incoming,
            Direction::Outgoing => &mut inner.outgoing,
        };
        queue.push_front(message);
        while queue.len() > STORE_CAP {
            queue.pop_back();
        }
    }

    /// Return up to `limit` messages.
    ///
    /// With a direction, the slice of that sequence (newest-first). Without,
    /// the union of both sequences sorted by `created_at` descending; ties
    /// put Incoming before Outgoing and keep insertion order within a
    /// direction.
    #[must_use]
    pub fn query(&self, direction: Option<Direction>, limit: usize) -> Vec<Message> {
        let inner = self.lock();
        match direction {
            Some(Direction::Incoming) => inner.incoming.iter().take(limit).cloned().collect(),
            Some(Direction::Outgoing) => inner.outgoing.iter().take(limit).cloned().collect(),
            None => {
                let mut all: Vec<Message> = inner
                    .incoming
                    .iter()
                    .chain(inner.outgoing.iter())
                    .cloned()
                    .collect();
                // Stable sort: for equal timestamps the chained order
                // (incoming first, newest-first within each) is preserved.
                all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                all.truncate(limit);
                all
            }
        }
    }

    /// Replace the body of an outgoing message and advance its generation
    /// state. A miss is a silent no-op: the reply may already have been
    /// evicted when a late partial arrives.
    pub fn update_partial(&self, id: &str, body: &str, complete: bool) {
        let mut inner = self.lock();
        if let Some(msg) = inner.outgoing.iter_mut().find(|m| m.id == id) {
            msg.body = body.to_string();
            msg.generation_state = Some(if complete {
                GenerationState::Complete
            } else {
                GenerationState::InProgress
            });
        }
    }

    /// Record the gateway's dispatch ack on an outgoing message. Unknown ids
    /// are ignored for the same reason as [`Self::update_partial`].
    pub fn record_dispatch(&self, id: &str, delivery_status: &str) {
        let mut inner = self.lock();
        if let Some(msg) = inner.outgoing.iter_mut().find(|m| m.id == id) {
            msg.delivery_status = Some(delivery_status.to_string());
        }
    }

    /// Per-direction counts for the snapshot response
    #[must_use]
    pub fn counts(&self) -> MessageCounts {
        let inner = self.lock();
        MessageCounts {
            incoming: inner.incoming.len(),
            outgoing: inner.outgoing.len(),
            total: inner.incoming.len() + inner.outgoing.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means another handler panicked mid-operation; the
        // store itself is still structurally sound (single push/pop ops).
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
