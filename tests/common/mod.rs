//! Shared test utilities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_gateway::channels::{AccountInfo, MessageChannel, OutboundContent, SendReceipt};
use courier_gateway::store::MessageStore;
use courier_gateway::stream::StreamHub;
use courier_gateway::{ApiServer, ApiState, Error, ReplyGenerator, Result};

/// Bot address used by the mock channel
pub const BOT_ADDRESS: &str = "whatsapp:+14155238886";

/// Dispatch channel double recording every send
pub struct MockChannel {
    pub fail: bool,
    pub sent: Mutex<Vec<(String, String)>>,
    counter: AtomicUsize,
}

impl MockChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fail: false,
            sent: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl MessageChannel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn outbound_address(&self) -> &str {
        BOT_ADDRESS
    }

    async fn send(&self, to: &str, content: &OutboundContent) -> Result<SendReceipt> {
        if self.fail {
            return Err(Error::Channel(
                "Twilio API error 401: Authentication Error (code 20003)".to_string(),
            ));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), content.stored_body()));
        Ok(SendReceipt {
            sid: format!("SM_TEST_{n}"),
            status: "queued".to_string(),
        })
    }

    async fn verify(&self) -> Result<AccountInfo> {
        if self.fail {
            return Err(Error::Channel("Authentication Error".to_string()));
        }
        Ok(AccountInfo {
            friendly_name: "Test Account".to_string(),
            status: "active".to_string(),
        })
    }
}

/// Reply generator double: fixed reply, scripted partials, or failure
pub struct MockGenerator {
    pub reply: Option<String>,
    pub partials: Option<Vec<String>>,
}

impl MockGenerator {
    #[must_use]
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            partials: None,
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            reply: None,
            partials: None,
        }
    }

    #[must_use]
    pub fn streaming(partials: &[&str]) -> Self {
        Self {
            reply: partials.last().map(|s| (*s).to_string()),
            partials: Some(partials.iter().map(|s| (*s).to_string()).collect()),
        }
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, _user_message: &str) -> Result<String> {
        self.reply
            .clone()
            .ok_or_else(|| Error::Completion("completion service unavailable".to_string()))
    }

    async fn generate_stream(&self, user_message: &str) -> Result<tokio::sync::mpsc::Receiver<String>> {
        let Some(partials) = self.partials.clone() else {
            let text = self.generate(user_message).await?;
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            drop(tx.send(text).await);
            return Ok(rx);
        };
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(async move {
            for partial in partials {
                if tx.send(partial).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Build test API state with the given doubles
#[must_use]
pub fn build_state(
    channel: Option<Arc<MockChannel>>,
    generator: Option<Arc<MockGenerator>>,
    streaming_replies: bool,
) -> Arc<ApiState> {
    Arc::new(ApiState {
        store: Arc::new(MessageStore::new()),
        hub: Arc::new(StreamHub::new()),
        channel: channel.map(|c| c as Arc<dyn MessageChannel>),
        generator: generator.map(|g| g as Arc<dyn ReplyGenerator>),
        streaming_replies,
        public_webhook_url: None,
    })
}

/// Build a test router around the given state
#[must_use]
pub fn build_router(state: Arc<ApiState>) -> axum::Router {
    ApiServer::router(state)
}
