//! Health and status endpoints

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "courier-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Gateway status for viewer display; not used for traffic routing
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    /// Whether the dispatch channel has credentials configured
    pub channel_configured: bool,
    /// The bot's outbound WhatsApp address, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_number: Option<String>,
    pub completion_configured: bool,
    pub streaming_replies: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Report dispatch channel configuration and the outbound address
pub async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        channel_configured: state.channel.is_some(),
        whatsapp_number: state
            .channel
            .as_ref()
            .map(|c| c.outbound_address().to_string()),
        completion_configured: state.generator.is_some(),
        streaming_replies: state.streaming_replies,
        webhook_url: state.public_webhook_url.clone(),
    })
}

/// Channel reachability check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCheckResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Verify the dispatch channel account is reachable with the configured
/// credentials
pub async fn test_channel(
    State(state): State<Arc<ApiState>>,
) -> (StatusCode, Json<ChannelCheckResponse>) {
    let Some(channel) = &state.channel else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ChannelCheckResponse {
                success: false,
                account_name: None,
                status: None,
                error: Some("dispatch channel not configured".to_string()),
            }),
        );
    };

    match channel.verify().await {
        Ok(info) => (
            StatusCode::OK,
            Json(ChannelCheckResponse {
                success: true,
                account_name: Some(info.friendly_name),
                status: Some(info.status),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ChannelCheckResponse {
                success: false,
                account_name: None,
                status: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}
