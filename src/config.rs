//! Configuration management for Courier gateway
//!
//! Everything comes from the environment (optionally seeded from a `.env`
//! file by the binary). Missing Twilio or OpenAI credentials degrade the
//! corresponding feature rather than failing startup: the webhook still
//! accepts events, replies fall back, sends report "not configured".

use crate::{Error, Result};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Courier gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the API server listens on
    pub port: u16,

    /// Twilio dispatch channel credentials; `None` disables dispatch
    pub twilio: Option<TwilioConfig>,

    /// OpenAI completion credentials; `None` forces the fallback reply
    pub openai: Option<OpenAiConfig>,

    /// Stream reply generation incrementally to viewers
    pub streaming_replies: bool,

    /// Publicly reachable webhook URL, for the status endpoint hint
    pub public_webhook_url: Option<String>,
}

/// Twilio channel configuration
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Bot's outbound address, e.g. `whatsapp:+14155238886`
    pub whatsapp_number: String,
}

/// OpenAI completion configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads `COURIER_PORT`, `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`,
    /// `TWILIO_WHATSAPP_NUMBER`, `OPENAI_API_KEY`, `OPENAI_MODEL`,
    /// `OPENAI_MAX_TOKENS`, `COURIER_STREAMING_REPLIES`, and
    /// `COURIER_WEBHOOK_URL`.
    ///
    /// # Errors
    ///
    /// Returns error if Twilio credentials are partially set, which is
    /// always a misconfiguration.
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("COURIER_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok();
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").ok();
        let whatsapp_number = std::env::var("TWILIO_WHATSAPP_NUMBER").ok();

        let twilio = match (account_sid, auth_token, whatsapp_number) {
            (Some(account_sid), Some(auth_token), Some(whatsapp_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                whatsapp_number: crate::channels::normalize_address(&whatsapp_number),
            }),
            (None, None, None) => None,
            _ => {
                return Err(Error::Config(
                    "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_WHATSAPP_NUMBER must be set together".to_string(),
                ));
            }
        };

        let openai = std::env::var("OPENAI_API_KEY").ok().map(|api_key| OpenAiConfig {
            api_key,
            model: std::env::var("OPENAI_MODEL").ok(),
            max_tokens: std::env::var("OPENAI_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok()),
        });

        let streaming_replies = std::env::var("COURIER_STREAMING_REPLIES")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            port,
            twilio,
            openai,
            streaming_replies,
            public_webhook_url: std::env::var("COURIER_WEBHOOK_URL").ok(),
        })
    }
}
