//! Reply generation against the AI completion service
//!
//! The adapter is fallible; the *policy* applied on the automatic reply path
//! is not. [`generate_with_fallback`] is the single place that decides a
//! completion failure turns into the fixed apology rather than an error, so
//! the conversation never silently stalls.

mod openai;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use openai::OpenAiGenerator;

use crate::Result;

/// Fixed reply used whenever the completion service is unreachable or errors
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble processing your request right now. Please try again later.";

/// Fixed system instruction establishing tone and scope
pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful WhatsApp assistant. Keep responses concise and friendly.";

/// A service that generates reply text for an incoming message
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generate a full reply atomically
    ///
    /// # Errors
    ///
    /// Returns error if the completion service is unreachable or errors
    async fn generate(&self, user_message: &str) -> Result<String>;

    /// Generate a reply incrementally.
    ///
    /// Each item on the returned channel is the *cumulative* text so far;
    /// channel close marks completion. The default implementation degrades
    /// to a single full completion.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened
    async fn generate_stream(&self, user_message: &str) -> Result<mpsc::Receiver<String>> {
        let text = self.generate(user_message).await?;
        let (tx, rx) = mpsc::channel(1);
        drop(tx.send(text).await);
        Ok(rx)
    }
}

/// The automatic reply path's recovery policy: completion failures are
/// recovered locally with [`FALLBACK_REPLY`] and never propagate.
pub async fn generate_with_fallback(
    generator: Option<&dyn ReplyGenerator>,
    user_message: &str,
) -> String {
    let Some(generator) = generator else {
        tracing::warn!("no completion service configured, using fallback reply");
        return FALLBACK_REPLY.to_string();
    };

    match generator.generate(user_message).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(generator = generator.name(), error = %e, "completion failed, using fallback reply");
            FALLBACK_REPLY.to_string()
        }
    }
}
