//! Courier Gateway - WhatsApp relay with AI auto-replies and live sync
//!
//! This library provides the core functionality for the Courier gateway:
//! - Webhook ingestion of inbound WhatsApp messages
//! - Reply generation via an AI completion service, with fallback
//! - Dispatch back through the messaging gateway
//! - Live synchronization of the conversation to viewer clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Messaging Gateway (Twilio)              │
//! └───────────┬─────────────────────────▲───────────────┘
//!       webhook│                         │dispatch
//! ┌───────────▼─────────────────────────┴───────────────┐
//! │                  Courier Gateway                     │
//! │  Ingestion │ Message Store │ Reply Gen │ Stream Hub  │
//! └───────────┬─────────────────────────┬───────────────┘
//!     snapshot│                         │partial events
//! ┌───────────▼─────────────────────────▼───────────────┐
//! │              Viewers (poll + subscribe)              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod completion;
pub mod config;
pub mod error;
pub mod store;
pub mod stream;
pub mod sync;

pub use api::{ApiServer, ApiServerBuilder, ApiState};
pub use channels::{MessageChannel, OutboundContent, SendReceipt, TwilioWhatsAppChannel};
pub use completion::{FALLBACK_REPLY, OpenAiGenerator, ReplyGenerator};
pub use config::Config;
pub use error::{Error, Result};
pub use store::{Direction, GenerationState, Message, MessageCounts, MessageStore};
pub use stream::{ReplyEvent, StreamHub, correlation_id_for};
pub use sync::ViewerClient;
