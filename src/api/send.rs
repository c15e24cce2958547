//! Manual send endpoint
//!
//! Unlike the automatic reply path, failures here surface to the caller
//! with the provider's error detail attached - this is the operator's tool
//! for diagnosing credentials and addressing problems.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::channels::OutboundContent;
use crate::store::{GenerationState, Message};

/// Manual send request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub to: Option<String>,
    pub message: Option<String>,
    pub content_sid: Option<String>,
    pub content_variables: Option<serde_json::Value>,
}

/// Manual send success response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub message_sid: String,
    pub status: String,
}

/// Manual send error response
#[derive(Debug, Serialize)]
pub struct SendError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Send a message through the dispatch channel
pub async fn send_message(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, (StatusCode, Json<SendError>)> {
    let Some(to) = request.to.as_deref().filter(|t| !t.is_empty()) else {
        return Err(client_error("'to' number is required"));
    };

    // A content template takes precedence over plain text when both are set
    let content = match (&request.content_sid, &request.message) {
        (Some(content_sid), _) if !content_sid.is_empty() => OutboundContent::Template {
            content_sid: content_sid.clone(),
            variables: request.content_variables.clone(),
        },
        (_, Some(message)) if !message.is_empty() => OutboundContent::Text(message.clone()),
        _ => return Err(client_error("either 'message' or 'contentSid' is required")),
    };

    // Stored body prefers the caller's text even for template sends
    let stored_body = request
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| content.stored_body());

    let Some(channel) = &state.channel else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SendError {
                error: "dispatch channel not configured".to_string(),
                details: None,
            }),
        ));
    };

    let to = crate::channels::normalize_address(to);
    match channel.send(&to, &content).await {
        Ok(receipt) => {
            state.store.append(
                Message::outgoing(
                    receipt.sid.clone(),
                    to.clone(),
                    stored_body,
                    GenerationState::Complete,
                )
                .with_delivery_status(receipt.status.clone()),
            );
            tracing::info!(to = %to, sid = %receipt.sid, status = %receipt.status, "manual message sent");

            Ok(Json(SendResponse {
                success: true,
                message_sid: receipt.sid,
                status: receipt.status,
            }))
        }
        Err(e) => {
            tracing::error!(to = %to, error = %e, "manual send failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SendError {
                    error: "failed to send message".to_string(),
                    details: Some(e.to_string()),
                }),
            ))
        }
    }
}

fn client_error(message: &str) -> (StatusCode, Json<SendError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(SendError {
            error: message.to_string(),
            details: None,
        }),
    )
}
