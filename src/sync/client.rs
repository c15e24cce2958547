//! Viewer client: snapshot polling plus incremental stream subscriptions
//!
//! The poll loop and every stream subscription run concurrently. The client
//! tracks which correlation identifiers it already follows, so recomputing
//! the wanted set on each poll never opens a second subscription for the
//! same identifier, and closes subscriptions whose identifier disappeared.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::merge::{ReplyOverlays, merged_view, wanted_subscriptions};
use crate::store::{Direction, Message, MessageCounts};
use crate::stream::ReplyEvent;
use crate::{Error, Result};

const SNAPSHOT_LIMIT: usize = 50;

/// A snapshot as returned by the gateway
#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub counts: MessageCounts,
}

/// Client for following a gateway's conversation in near-real time
pub struct ViewerClient {
    api_url: String,
    ws_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl ViewerClient {
    /// Create a viewer for the gateway at `api_url` (e.g. `http://host:3000`)
    #[must_use]
    pub fn new(api_url: &str, poll_interval: Duration) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        let ws_url = ws_base_url(&api_url);
        Self {
            api_url,
            ws_url,
            client: reqwest::Client::new(),
            poll_interval,
        }
    }

    /// Fetch the current snapshot
    ///
    /// # Errors
    ///
    /// Returns error if the gateway is unreachable or responds abnormally
    pub async fn fetch_snapshot(&self, limit: usize) -> Result<Snapshot> {
        let response = self
            .client
            .get(format!("{}/api/messages", self.api_url))
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Sync(format!(
                "snapshot query failed: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Run the reconciliation loop, printing the merged conversation.
    /// Runs until the task is cancelled.
    ///
    /// # Errors
    ///
    /// Returns error only on setup failure; transient poll and stream
    /// errors are logged and retried on the next interval
    pub async fn run(self) -> Result<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut overlays = ReplyOverlays::new();
        let mut snapshot: Vec<Message> = Vec::new();
        // Open subscriptions by correlation id
        let mut open: HashMap<String, JoinHandle<()>> = HashMap::new();
        let (event_tx, mut event_rx) = mpsc::channel::<ReplyEvent>(64);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.fetch_snapshot(SNAPSHOT_LIMIT).await {
                        Ok(fresh) => {
                            snapshot = fresh.messages;
                            self.reconcile_subscriptions(&snapshot, &mut open, &event_tx);
                            render(&snapshot, &overlays, fresh.counts);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "snapshot poll failed, retrying next interval");
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    if event.done {
                        if let Some(handle) = open.remove(&event.correlation_id) {
                            handle.abort();
                        }
                    }
                    overlays.apply(&event);
                    let counts = MessageCounts {
                        incoming: snapshot.iter().filter(|m| m.direction == Direction::Incoming).count(),
                        outgoing: snapshot.iter().filter(|m| m.direction == Direction::Outgoing).count(),
                        total: snapshot.len(),
                    };
                    render(&snapshot, &overlays, counts);
                }
            }
        }
    }

    /// Bring the open subscription set in line with the snapshot: close
    /// streams whose identifier disappeared, open one stream per newly
    /// appeared identifier. Both directions are idempotent.
    fn reconcile_subscriptions(
        &self,
        snapshot: &[Message],
        open: &mut HashMap<String, JoinHandle<()>>,
        event_tx: &mpsc::Sender<ReplyEvent>,
    ) {
        // Subscriptions whose task already ended need no close
        open.retain(|_, handle| !handle.is_finished());

        let wanted = wanted_subscriptions(snapshot);
        let open_ids: Vec<String> = open.keys().cloned().collect();
        let delta = subscription_delta(&wanted, &open_ids);

        for correlation_id in delta.to_close {
            tracing::debug!(correlation_id = %correlation_id, "closing stale subscription");
            if let Some(handle) = open.remove(&correlation_id) {
                handle.abort();
            }
        }

        for correlation_id in delta.to_open {
            tracing::debug!(correlation_id = %correlation_id, "opening subscription");
            let url = format!("{}/ws/stream/{correlation_id}", self.ws_url);
            let tx = event_tx.clone();
            let handle = tokio::spawn(follow_stream(url, correlation_id.clone(), tx));
            open.insert(correlation_id, handle);
        }
    }
}

/// Difference between the wanted and currently open subscription sets
#[derive(Debug, PartialEq, Eq)]
struct SubscriptionDelta {
    to_open: Vec<String>,
    to_close: Vec<String>,
}

/// Decide which subscriptions to open and which to close. Pure, so the
/// lifecycle rules can be tested without spawning stream tasks. Identifiers
/// in both sets are left alone, which is what makes reopening idempotent.
fn subscription_delta(wanted: &[String], open: &[String]) -> SubscriptionDelta {
    SubscriptionDelta {
        to_open: wanted
            .iter()
            .filter(|id| !open.contains(id))
            .cloned()
            .collect(),
        to_close: open
            .iter()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect(),
    }
}

/// Follow one incremental stream, forwarding its events to the reconciler.
/// Ends on the `done` event, on socket close, or on error.
async fn follow_stream(url: String, correlation_id: String, tx: mpsc::Sender<ReplyEvent>) {
    let (ws, _) = match connect_async(url.as_str()).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(correlation_id = %correlation_id, error = %e, "stream connect failed");
            return;
        }
    };

    let (_, mut read) = ws.split();
    while let Some(frame) = read.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let Ok(event) = serde_json::from_str::<ReplyEvent>(&text) else {
                    tracing::debug!(correlation_id = %correlation_id, "ignoring unparseable stream frame");
                    continue;
                };
                let done = event.done;
                if tx.send(event).await.is_err() || done {
                    return;
                }
            }
            Ok(WsMessage::Close(_)) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Derive the WebSocket base URL from the HTTP API URL
fn ws_base_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{api_url}")
    }
}

/// Print the merged conversation, oldest first
fn render(snapshot: &[Message], overlays: &ReplyOverlays, counts: MessageCounts) {
    let merged = merged_view(snapshot, overlays);

    println!(
        "\n--- conversation ({} in / {} out) ---",
        counts.incoming, counts.outgoing
    );
    for message in merged.iter().rev() {
        let (who, marker) = match message.direction {
            Direction::Incoming => (
                message
                    .display_name
                    .clone()
                    .unwrap_or_else(|| message.counterparty_display.clone()),
                "",
            ),
            Direction::Outgoing => (
                "bot".to_string(),
                if message.is_in_progress() { " …" } else { "" },
            ),
        };
        println!(
            "[{}] {who}: {}{marker}",
            message.created_at.format("%H:%M:%S"),
            message.body
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GenerationState;

    #[test]
    fn ws_base_url_swaps_scheme() {
        assert_eq!(ws_base_url("http://localhost:3000"), "ws://localhost:3000");
        assert_eq!(ws_base_url("https://gw.example.com"), "wss://gw.example.com");
        assert_eq!(ws_base_url("localhost:3000"), "ws://localhost:3000");
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn delta_opens_only_new_identifiers() {
        let delta = subscription_delta(&ids(&["gen-a", "gen-b"]), &ids(&["gen-a"]));
        assert_eq!(delta.to_open, ids(&["gen-b"]));
        assert!(delta.to_close.is_empty());
    }

    #[test]
    fn delta_is_empty_when_sets_agree() {
        let delta = subscription_delta(&ids(&["gen-a"]), &ids(&["gen-a"]));
        assert!(delta.to_open.is_empty());
        assert!(delta.to_close.is_empty());
    }

    #[test]
    fn delta_closes_disappeared_identifiers() {
        let delta = subscription_delta(&ids(&[]), &ids(&["gen-a", "gen-b"]));
        assert!(delta.to_open.is_empty());
        assert_eq!(delta.to_close, ids(&["gen-a", "gen-b"]));
    }

    fn in_progress(id: &str) -> Message {
        Message::outgoing(
            id.to_string(),
            "whatsapp:+1".to_string(),
            String::new(),
            GenerationState::InProgress,
        )
    }

    #[tokio::test]
    async fn reconcile_tracks_open_set_across_snapshots() {
        // Unroutable gateway: spawned stream tasks fail to connect and end
        let viewer = ViewerClient::new("http://127.0.0.1:9", Duration::from_secs(3));
        let (event_tx, _event_rx) = mpsc::channel(8);
        let mut open: HashMap<String, JoinHandle<()>> = HashMap::new();

        // A finished task for a stale identifier must be swept out
        let finished = tokio::spawn(async {});
        while !finished.is_finished() {
            tokio::task::yield_now().await;
        }
        open.insert("gen-finished".to_string(), finished);

        let snapshot = vec![in_progress("gen-SM1")];
        viewer.reconcile_subscriptions(&snapshot, &mut open, &event_tx);
        assert_eq!(open.len(), 1);
        assert!(open.contains_key("gen-SM1"));

        // Same snapshot again: open is idempotent, no second subscription
        viewer.reconcile_subscriptions(&snapshot, &mut open, &event_tx);
        assert_eq!(open.len(), 1);

        // Identifier gone from the snapshot: subscription closed
        viewer.reconcile_subscriptions(&[], &mut open, &event_tx);
        assert!(open.is_empty());
    }
}
