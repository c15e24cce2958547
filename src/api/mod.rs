//! HTTP API server for Courier gateway

pub mod health;
pub mod messages;
pub mod send;
pub mod stream;
pub mod webhook;

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::channels::MessageChannel;
use crate::completion::ReplyGenerator;
use crate::store::MessageStore;
use crate::stream::StreamHub;
use crate::{Config, Result};

/// Shared state for API handlers
pub struct ApiState {
    /// Single source of truth for the conversation
    pub store: Arc<MessageStore>,
    /// In-flight reply streams for viewers
    pub hub: Arc<StreamHub>,
    /// Dispatch channel; `None` when Twilio is not configured
    pub channel: Option<Arc<dyn MessageChannel>>,
    /// Completion service; `None` forces the fallback reply
    pub generator: Option<Arc<dyn ReplyGenerator>>,
    /// Generate replies incrementally and stream them to viewers
    pub streaming_replies: bool,
    /// Publicly reachable webhook URL hint for the status endpoint
    pub public_webhook_url: Option<String>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    port: u16,
    channel: Option<Arc<dyn MessageChannel>>,
    generator: Option<Arc<dyn ReplyGenerator>>,
    streaming_replies: bool,
    public_webhook_url: Option<String>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            channel: None,
            generator: None,
            streaming_replies: false,
            public_webhook_url: None,
        }
    }

    /// Build a server from loaded configuration, wiring up the Twilio
    /// channel and OpenAI generator where credentials are present.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new(config.port)
            .streaming_replies(config.streaming_replies)
            .public_webhook_url(config.public_webhook_url.clone());

        if let Some(twilio) = &config.twilio {
            builder = builder.channel(Arc::new(crate::channels::TwilioWhatsAppChannel::new(
                twilio.account_sid.clone(),
                twilio.auth_token.clone(),
                twilio.whatsapp_number.clone(),
            )));
        } else {
            tracing::warn!("Twilio not configured, dispatch disabled");
        }

        if let Some(openai) = &config.openai {
            let mut generator = crate::completion::OpenAiGenerator::new(openai.api_key.clone());
            if let Some(model) = &openai.model {
                generator = generator.with_model(model.clone());
            }
            if let Some(max_tokens) = openai.max_tokens {
                generator = generator.with_max_tokens(max_tokens);
            }
            builder = builder.generator(Arc::new(generator));
        } else {
            tracing::warn!("OpenAI not configured, replies will use the fallback text");
        }

        builder
    }

    /// Set the dispatch channel
    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the reply generator
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn ReplyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Enable incremental reply streaming
    #[must_use]
    pub fn streaming_replies(mut self, enabled: bool) -> Self {
        self.streaming_replies = enabled;
        self
    }

    /// Set the public webhook URL hint
    #[must_use]
    pub fn public_webhook_url(mut self, url: Option<String>) -> Self {
        self.public_webhook_url = url;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            store: Arc::new(MessageStore::new()),
            hub: Arc::new(StreamHub::new()),
            channel: self.channel,
            generator: self.generator,
            streaming_replies: self.streaming_replies,
            public_webhook_url: self.public_webhook_url,
        });

        ApiServer {
            state,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(state: Arc<ApiState>) -> Router {
        let router = Router::new()
            .route(
                "/webhook/whatsapp",
                post(webhook::handle_inbound).get(webhook::probe),
            )
            .route("/webhook/test", any(webhook::echo))
            .route("/api/messages", get(messages::list))
            .route("/api/send-message", post(send::send_message))
            .route("/api/health", get(health::health))
            .route("/api/status", get(health::status))
            .route("/api/test-twilio", get(health::test_channel))
            .route("/ws/stream/{correlation_id}", get(stream::ws_upgrade))
            .with_state(state);

        // CORS for the viewer frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, Self::router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
