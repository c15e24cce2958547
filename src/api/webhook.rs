//! Inbound webhook handler and the automatic reply pipeline
//!
//! Twilio delivers one message event per call, form-encoded, and treats any
//! 2xx response as "delivered, do not retry". The contract here is strict:
//! a structurally valid event is always acknowledged with success, even when
//! reply generation or dispatch failed downstream - a retry would duplicate
//! both the stored incoming message and the outbound reply. Only malformed
//! events get a 4xx, because retrying those can never succeed.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::channels::OutboundContent;
use crate::completion::{FALLBACK_REPLY, generate_with_fallback};
use crate::store::{GenerationState, Message};
use crate::stream::{ReplyEvent, correlation_id_for};
use crate::Error;

/// Inbound message event as Twilio posts it. Lowercase aliases cover
/// manually-crafted test events; Twilio itself always capitalizes.
#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "From", alias = "from")]
    pub from: Option<String>,
    #[serde(rename = "Body", alias = "body")]
    pub body: Option<String>,
    #[serde(rename = "MessageSid", alias = "messageSid")]
    pub message_sid: Option<String>,
    #[serde(rename = "ProfileName", alias = "profileName")]
    pub profile_name: Option<String>,
}

/// Outcome of the automatic reply pipeline.
///
/// The webhook acknowledges the gateway the same way for every variant;
/// this type exists so the swallow decision is explicit and logged, not an
/// accident of a blanket catch.
#[derive(Debug)]
pub enum ReplyDisposition {
    /// Reply generated and accepted by the gateway
    Dispatched { sid: String, status: String },
    /// Reply generated but the gateway rejected or was unreachable
    DispatchFailed(Error),
    /// No dispatch channel configured
    NotConfigured,
}

/// Handle an inbound WhatsApp message event
pub async fn handle_inbound(
    State(state): State<Arc<ApiState>>,
    Form(event): Form<InboundEvent>,
) -> (StatusCode, &'static str) {
    let body = event.body.as_deref().unwrap_or_default();
    let from = event.from.as_deref().unwrap_or_default();

    if body.is_empty() || from.is_empty() {
        tracing::warn!(
            has_body = !body.is_empty(),
            has_from = !from.is_empty(),
            "rejecting malformed webhook event"
        );
        return (StatusCode::BAD_REQUEST, "Missing required fields");
    }

    // Self-loop guard: if the gateway ever echoes our own sends back as
    // inbound, acknowledge and do nothing
    if let Some(channel) = &state.channel {
        if from == channel.outbound_address() {
            tracing::debug!("ignoring message from the bot's own address");
            return (StatusCode::OK, "OK");
        }
    }

    let id = event
        .message_sid
        .clone()
        .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4()));

    tracing::info!(
        from = %from,
        profile = event.profile_name.as_deref().unwrap_or("unknown"),
        id = %id,
        "incoming WhatsApp message"
    );

    let incoming = Message::incoming(
        id,
        from.to_string(),
        event.profile_name.clone(),
        body.to_string(),
    );
    state.store.append(incoming.clone());

    // The gateway ack is deferred until the reply has been dispatched or has
    // definitively failed; failures are swallowed per the contract above.
    match run_reply_pipeline(&state, &incoming).await {
        ReplyDisposition::Dispatched { sid, status } => {
            tracing::info!(to = %incoming.counterparty, sid = %sid, status = %status, "reply dispatched");
        }
        ReplyDisposition::DispatchFailed(e) => {
            tracing::error!(to = %incoming.counterparty, error = %e, "reply dispatch failed, acknowledging anyway");
        }
        ReplyDisposition::NotConfigured => {
            tracing::warn!("no dispatch channel configured, reply not sent");
        }
    }

    (StatusCode::OK, "OK")
}

/// Generate a reply for an incoming message and dispatch it.
///
/// Completion failures never surface: the fallback reply is dispatched
/// instead. Dispatch failures are reported in the disposition for the
/// caller to log.
pub async fn run_reply_pipeline(state: &ApiState, incoming: &Message) -> ReplyDisposition {
    let correlation_id = correlation_id_for(&incoming.id);

    let reply_text = if state.streaming_replies && state.generator.is_some() {
        generate_streaming(state, incoming, &correlation_id).await
    } else {
        generate_with_fallback(state.generator.as_deref(), &incoming.body).await
    };

    let Some(channel) = &state.channel else {
        return ReplyDisposition::NotConfigured;
    };

    let content = OutboundContent::Text(reply_text.clone());
    match channel.send(&incoming.counterparty, &content).await {
        Ok(receipt) => {
            if state.streaming_replies && state.generator.is_some() {
                // The in-progress placeholder (keyed by correlation id) is
                // already in the store; attach the gateway ack to it.
                state.store.record_dispatch(&correlation_id, &receipt.status);
            } else {
                state.store.append(
                    Message::outgoing(
                        receipt.sid.clone(),
                        incoming.counterparty.clone(),
                        reply_text,
                        GenerationState::Complete,
                    )
                    .with_correlation_id(correlation_id)
                    .with_delivery_status(receipt.status.clone()),
                );
            }
            ReplyDisposition::Dispatched {
                sid: receipt.sid,
                status: receipt.status,
            }
        }
        Err(e) => ReplyDisposition::DispatchFailed(e),
    }
}

/// Incremental generation: appends an in-progress placeholder so snapshot
/// viewers see the reply forming, mirrors each cumulative partial into the
/// store, and publishes it on the stream hub. Returns the final text.
async fn generate_streaming(state: &ApiState, incoming: &Message, correlation_id: &str) -> String {
    let Some(generator) = &state.generator else {
        return FALLBACK_REPLY.to_string();
    };

    state.hub.open(correlation_id).await;
    state.store.append(
        Message::outgoing(
            correlation_id.to_string(),
            incoming.counterparty.clone(),
            String::new(),
            GenerationState::InProgress,
        )
        .with_correlation_id(correlation_id.to_string()),
    );

    let final_text = match generator.generate_stream(&incoming.body).await {
        Ok(mut rx) => {
            let mut last = String::new();
            while let Some(text) = rx.recv().await {
                state.store.update_partial(correlation_id, &text, false);
                state
                    .hub
                    .publish(ReplyEvent::partial(correlation_id, &text))
                    .await;
                last = text;
            }
            if last.is_empty() {
                tracing::warn!(correlation_id = %correlation_id, "stream produced no text, using fallback reply");
                FALLBACK_REPLY.to_string()
            } else {
                last
            }
        }
        Err(e) => {
            tracing::error!(correlation_id = %correlation_id, error = %e, "streaming completion failed, using fallback reply");
            FALLBACK_REPLY.to_string()
        }
    };

    state.store.update_partial(correlation_id, &final_text, true);
    state
        .hub
        .publish(ReplyEvent::complete(correlation_id, &final_text))
        .await;

    final_text
}

/// Reachability probe response for `GET /webhook/whatsapp`
#[derive(Serialize)]
pub struct ProbeResponse {
    pub message: &'static str,
    pub note: &'static str,
}

/// Webhook reachability probe; Twilio itself only ever POSTs here
pub async fn probe() -> Json<ProbeResponse> {
    Json(ProbeResponse {
        message: "Webhook endpoint is accessible",
        note: "Twilio delivers message events via POST. This GET endpoint only verifies reachability.",
    })
}

/// Echo response for the connectivity test endpoint
#[derive(Serialize)]
pub struct EchoResponse {
    pub success: bool,
    pub message: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Connectivity test endpoint, accepts any method
pub async fn echo() -> Json<EchoResponse> {
    Json(EchoResponse {
        success: true,
        message: "Webhook is accessible. Use /webhook/whatsapp for Twilio.",
        timestamp: chrono::Utc::now(),
    })
}
