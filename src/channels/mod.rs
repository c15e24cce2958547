//! Messaging channel adapters
//!
//! A channel dispatches outbound replies and reports the gateway's immediate
//! acknowledgement. Delivery receipts beyond the ack are out of scope.

mod twilio;

use async_trait::async_trait;
use serde::Serialize;

pub use twilio::TwilioWhatsAppChannel;

use crate::Result;

/// Transport prefix the WhatsApp gateway uses in addresses
pub const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Immediate acknowledgement from the gateway for a dispatched message
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    /// Provider-assigned message identifier
    pub sid: String,
    /// Opaque status string from the ack (e.g. "queued", "sent")
    pub status: String,
}

/// Basic account details from a channel reachability check
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub friendly_name: String,
    pub status: String,
}

/// Body of an outbound send
#[derive(Debug, Clone)]
pub enum OutboundContent {
    /// Plain text reply
    Text(String),
    /// Named content template with optional variables
    Template {
        content_sid: String,
        variables: Option<serde_json::Value>,
    },
}

impl OutboundContent {
    /// Text to record in the store for this send
    #[must_use]
    pub fn stored_body(&self) -> String {
        match self {
            Self::Text(body) => body.clone(),
            Self::Template { content_sid, .. } => format!("[Content Template: {content_sid}]"),
        }
    }
}

/// A messaging channel the gateway can dispatch replies through
#[async_trait]
pub trait MessageChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// The bot's own outbound address, used for the self-loop guard
    fn outbound_address(&self) -> &str;

    /// Send a message, returning the gateway's immediate ack
    ///
    /// # Errors
    ///
    /// Returns error if the gateway rejects the send or is unreachable
    async fn send(&self, to: &str, content: &OutboundContent) -> Result<SendReceipt>;

    /// Check the channel's account is reachable with the configured credentials
    ///
    /// # Errors
    ///
    /// Returns error if the account lookup fails
    async fn verify(&self) -> Result<AccountInfo>;
}

/// Normalize a destination into the gateway's addressing scheme.
///
/// Bare phone-style addresses gain the `whatsapp:` prefix; already-prefixed
/// addresses pass through unchanged, so the operation is idempotent.
#[must_use]
pub fn normalize_address(to: &str) -> String {
    if to.starts_with(WHATSAPP_PREFIX) {
        to.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{to}")
    }
}

/// Strip the transport prefix for display
#[must_use]
pub fn display_address(addr: &str) -> String {
    addr.strip_prefix(WHATSAPP_PREFIX).unwrap_or(addr).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_prefix_to_bare_number() {
        assert_eq!(normalize_address("+14155551234"), "whatsapp:+14155551234");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_address("+14155551234");
        assert_eq!(normalize_address(&once), once);
    }

    #[test]
    fn display_strips_prefix() {
        assert_eq!(display_address("whatsapp:+14155551234"), "+14155551234");
        assert_eq!(display_address("+14155551234"), "+14155551234");
    }

    #[test]
    fn template_stored_body_names_the_template() {
        let content = OutboundContent::Template {
            content_sid: "HX123".to_string(),
            variables: None,
        };
        assert_eq!(content.stored_body(), "[Content Template: HX123]");
    }
}
