//! Snapshot/stream reconciliation
//!
//! The snapshot's message ids, the stream's correlation ids, and ids derived
//! from counterparties are three independent naming schemes. All matching
//! between them lives here, behind a documented priority order, so tests can
//! exercise it directly against literal id strings.

use std::collections::HashMap;

use crate::store::{Direction, Message};
use crate::stream::{ReplyEvent, STREAM_ID_PREFIX, correlation_id_for};

/// Resolve the correlation identifier for an outgoing snapshot entry that is
/// still generating.
///
/// Priority order:
/// 1. an explicit `correlation_id` on the message;
/// 2. the message `id` itself, when it already follows the stream-id
///    convention (`gen-` prefix);
/// 3. an id derived from the most recent incoming message sharing the same
///    counterparty.
///
/// Returns `None` when none of the three apply; such an entry cannot be
/// followed and waits for the next snapshot.
#[must_use]
pub fn resolve_correlation_id(message: &Message, snapshot: &[Message]) -> Option<String> {
    if let Some(correlation_id) = &message.correlation_id {
        return Some(correlation_id.clone());
    }
    if message.id.starts_with(STREAM_ID_PREFIX) {
        return Some(message.id.clone());
    }
    // Snapshot is newest-first, so the first match is the most recent
    snapshot
        .iter()
        .find(|m| {
            m.direction == Direction::Incoming
                && m.counterparty_display == message.counterparty_display
        })
        .map(|m| correlation_id_for(&m.id))
}

/// Compute the set of stream subscriptions the viewer should hold open:
/// one per distinct resolved identifier across all in-progress outgoing
/// entries in the snapshot. Order follows the snapshot.
#[must_use]
pub fn wanted_subscriptions(snapshot: &[Message]) -> Vec<String> {
    let mut wanted = Vec::new();
    for message in snapshot.iter().filter(|m| m.is_in_progress()) {
        if let Some(id) = resolve_correlation_id(message, snapshot) {
            if !wanted.contains(&id) {
                wanted.push(id);
            }
        } else {
            tracing::warn!(id = %message.id, "in-progress reply with no resolvable correlation id");
        }
    }
    wanted
}

/// Whether a stream event with `correlation_id` belongs to this snapshot
/// entry. The snapshot's `id` and the stream's identifier may differ in
/// format, so equality is checked against each candidate identifier, with
/// substring containment as the fallback.
#[must_use]
pub fn event_matches(message: &Message, correlation_id: &str) -> bool {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(c) = &message.correlation_id {
        candidates.push(c);
    }
    candidates.push(&message.id);

    candidates.iter().any(|candidate| {
        *candidate == correlation_id
            || candidate.contains(correlation_id)
            || correlation_id.contains(*candidate)
    })
}

/// Transient overlay of stream text, keyed by correlation identifier.
///
/// Never authoritative: a completion event drops the overlay and the next
/// snapshot poll supplies the final state.
#[derive(Debug, Default)]
pub struct ReplyOverlays {
    texts: HashMap<String, String>,
}

impl ReplyOverlays {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one stream event. Partials replace the overlay text (events
    /// carry cumulative text); a completion event clears the overlay.
    pub fn apply(&mut self, event: &ReplyEvent) {
        if event.done {
            self.texts.remove(&event.correlation_id);
        } else {
            self.texts
                .insert(event.correlation_id.clone(), event.text.clone());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.texts.iter()
    }
}

/// Merge stream overlays onto a snapshot.
///
/// Each in-progress outgoing entry gets the overlay text of the identifier
/// it matches. When more than one overlay matches a single entry the case is
/// flagged and left untouched rather than silently resolved - coincidental
/// id overlap would otherwise show the wrong reply text.
#[must_use]
pub fn merged_view(snapshot: &[Message], overlays: &ReplyOverlays) -> Vec<Message> {
    let mut merged: Vec<Message> = snapshot.to_vec();
    for message in &mut merged {
        if !message.is_in_progress() {
            continue;
        }
        let matches: Vec<(&String, &String)> = overlays
            .iter()
            .filter(|(correlation_id, _)| event_matches(message, correlation_id))
            .collect();
        match matches.as_slice() {
            [] => {}
            [(_, text)] => {
                message.body = (*text).clone();
            }
            _ => {
                tracing::warn!(
                    id = %message.id,
                    candidates = matches.len(),
                    "ambiguous overlay match, leaving snapshot text untouched"
                );
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GenerationState, Message};

    fn in_progress(id: &str, to: &str) -> Message {
        Message::outgoing(
            id.to_string(),
            to.to_string(),
            String::new(),
            GenerationState::InProgress,
        )
    }

    fn incoming(id: &str, from: &str) -> Message {
        Message::incoming(id.to_string(), from.to_string(), None, "hi".to_string())
    }

    #[test]
    fn resolution_prefers_explicit_correlation_id() {
        let msg = in_progress("SM555", "whatsapp:+1").with_correlation_id("gen-explicit".to_string());
        assert_eq!(
            resolve_correlation_id(&msg, &[]),
            Some("gen-explicit".to_string())
        );
    }

    #[test]
    fn resolution_accepts_convention_following_id() {
        let msg = in_progress("gen-SM123", "whatsapp:+1");
        assert_eq!(
            resolve_correlation_id(&msg, &[]),
            Some("gen-SM123".to_string())
        );
    }

    #[test]
    fn resolution_derives_from_most_recent_matching_incoming() {
        let msg = in_progress("SM999", "whatsapp:+14155551234");
        // Newest-first: SM2 is the most recent incoming from this number
        let snapshot = vec![
            incoming("SM2", "whatsapp:+14155551234"),
            incoming("SM1", "whatsapp:+14155551234"),
            incoming("SM3", "whatsapp:+19990001111"),
        ];
        assert_eq!(
            resolve_correlation_id(&msg, &snapshot),
            Some("gen-SM2".to_string())
        );
    }

    #[test]
    fn resolution_fails_without_any_scheme() {
        let msg = in_progress("SM999", "whatsapp:+14155551234");
        assert_eq!(resolve_correlation_id(&msg, &[]), None);
    }

    #[test]
    fn wanted_subscriptions_deduplicates() {
        let a = in_progress("gen-SM1", "whatsapp:+1");
        let b = in_progress("SM77", "whatsapp:+1").with_correlation_id("gen-SM1".to_string());
        let complete = Message::outgoing(
            "SM88".to_string(),
            "whatsapp:+1".to_string(),
            "done".to_string(),
            GenerationState::Complete,
        );

        let snapshot = vec![a, b, complete];
        assert_eq!(wanted_subscriptions(&snapshot), vec!["gen-SM1".to_string()]);
    }

    #[test]
    fn wanted_subscriptions_skips_unresolvable() {
        let snapshot = vec![in_progress("SM999", "whatsapp:+1")];
        assert!(wanted_subscriptions(&snapshot).is_empty());
    }

    #[test]
    fn event_matching_covers_equality_and_containment() {
        let exact = in_progress("gen-SM1", "whatsapp:+1");
        assert!(event_matches(&exact, "gen-SM1"));

        // Snapshot id embeds the stream id in a longer provider format
        let longer = in_progress("provider-gen-SM1-final", "whatsapp:+1");
        assert!(event_matches(&longer, "gen-SM1"));

        // Stream id embeds the snapshot id
        let shorter = in_progress("SM1", "whatsapp:+1");
        assert!(event_matches(&shorter, "gen-SM1"));

        let unrelated = in_progress("SM2x", "whatsapp:+1");
        assert!(!event_matches(&unrelated, "gen-SM1"));
    }

    #[test]
    fn overlay_applies_cumulative_partials() {
        let mut overlays = ReplyOverlays::new();
        overlays.apply(&ReplyEvent::partial("gen-1", "Hel"));
        overlays.apply(&ReplyEvent::partial("gen-1", "Hello"));

        let snapshot = vec![in_progress("gen-1", "whatsapp:+1")];
        let merged = merged_view(&snapshot, &overlays);
        assert_eq!(merged[0].body, "Hello");
    }

    #[test]
    fn completion_event_drops_overlay_state() {
        let mut overlays = ReplyOverlays::new();
        overlays.apply(&ReplyEvent::partial("gen-1", "Hello"));
        overlays.apply(&ReplyEvent::complete("gen-1", "Hello!"));
        assert!(overlays.is_empty());

        // After completion the snapshot is authoritative
        let snapshot = vec![in_progress("gen-1", "whatsapp:+1")];
        let merged = merged_view(&snapshot, &overlays);
        assert_eq!(merged[0].body, "");
    }

    #[test]
    fn overlays_never_touch_complete_messages() {
        let mut overlays = ReplyOverlays::new();
        overlays.apply(&ReplyEvent::partial("gen-1", "overlay"));

        let complete = Message::outgoing(
            "gen-1".to_string(),
            "whatsapp:+1".to_string(),
            "final".to_string(),
            GenerationState::Complete,
        );
        let merged = merged_view(&[complete], &overlays);
        assert_eq!(merged[0].body, "final");
    }

    #[test]
    fn ambiguous_overlay_match_is_left_untouched() {
        let mut overlays = ReplyOverlays::new();
        overlays.apply(&ReplyEvent::partial("gen-SM1", "first"));
        overlays.apply(&ReplyEvent::partial("gen-SM1-retry", "second"));

        // Contains both identifiers, so both overlays match
        let snapshot = vec![in_progress("gen-SM1-retry", "whatsapp:+1")];
        let merged = merged_view(&snapshot, &overlays);
        assert_eq!(merged[0].body, "");
    }
}
