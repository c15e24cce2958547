//! Snapshot query endpoint
//!
//! Viewers poll this periodically and reconcile the result with any open
//! incremental streams; the store is authoritative.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::store::{Direction, Message, MessageCounts};

const DEFAULT_LIMIT: usize = 100;

/// Query parameters for the snapshot endpoint
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Optional direction filter: "incoming" or "outgoing"
    #[serde(rename = "type")]
    pub direction: Option<String>,
    pub limit: Option<usize>,
}

/// Snapshot response: messages plus aggregate counts per direction
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub messages: Vec<Message>,
    pub counts: MessageCounts,
}

/// Return the current message snapshot
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListQuery>,
) -> Json<SnapshotResponse> {
    let direction = match query.direction.as_deref() {
        Some("incoming") => Some(Direction::Incoming),
        Some("outgoing") => Some(Direction::Outgoing),
        _ => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let messages = state.store.query(direction, limit);
    tracing::debug!(
        count = messages.len(),
        direction = ?direction,
        limit,
        "snapshot query"
    );

    Json(SnapshotResponse {
        messages,
        counts: state.store.counts(),
    })
}
