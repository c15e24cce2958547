//! Twilio WhatsApp channel adapter
//!
//! Sends through the Twilio Messages API. Inbound traffic arrives separately
//! via the webhook endpoint; this adapter only covers dispatch and the
//! account reachability check.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{AccountInfo, MessageChannel, OutboundContent, SendReceipt, normalize_address};
use crate::{Error, Result};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Twilio WhatsApp channel adapter
pub struct TwilioWhatsAppChannel {
    account_sid: String,
    auth_token: String,
    /// Bot's outbound address, e.g. `whatsapp:+14155238886`
    from_address: String,
    api_base: String,
    client: Client,
}

/// Message resource returned by the Twilio send API
#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
    status: String,
}

/// Account resource returned by the Twilio account API
#[derive(Debug, Deserialize)]
struct TwilioAccountResponse {
    friendly_name: String,
    status: String,
}

/// Error body Twilio attaches to non-2xx responses
#[derive(Debug, Deserialize)]
struct TwilioErrorResponse {
    code: Option<i64>,
    message: Option<String>,
}

impl TwilioWhatsAppChannel {
    /// Create a new Twilio WhatsApp channel adapter
    #[must_use]
    pub fn new(account_sid: String, auth_token: String, from_address: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_address,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    /// Override the API base URL (tests)
    #[must_use]
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Turn a non-2xx Twilio response into a channel error carrying the
    /// provider's error code and message, for manual-send diagnostics.
    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<TwilioErrorResponse>(&body)
            .ok()
            .and_then(|e| {
                e.message
                    .map(|m| format!("{m} (code {})", e.code.unwrap_or_default()))
            })
            .unwrap_or(body);
        Error::Channel(format!("Twilio API error {status}: {detail}"))
    }
}

#[async_trait]
impl MessageChannel for TwilioWhatsAppChannel {
    fn name(&self) -> &'static str {
        "twilio-whatsapp"
    }

    fn outbound_address(&self) -> &str {
        &self.from_address
    }

    async fn send(&self, to: &str, content: &OutboundContent) -> Result<SendReceipt> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );

        let to = normalize_address(to);
        let mut form: Vec<(&str, String)> = vec![
            ("From", self.from_address.clone()),
            ("To", to.clone()),
        ];
        match content {
            OutboundContent::Text(body) => form.push(("Body", body.clone())),
            OutboundContent::Template {
                content_sid,
                variables,
            } => {
                form.push(("ContentSid", content_sid.clone()));
                if let Some(vars) = variables {
                    form.push(("ContentVariables", vars.to_string()));
                }
            }
        }

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Twilio request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let message: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("failed to parse Twilio response: {e}")))?;

        tracing::debug!(to = %to, sid = %message.sid, status = %message.status, "WhatsApp message sent");

        Ok(SendReceipt {
            sid: message.sid,
            status: message.status,
        })
    }

    async fn verify(&self) -> Result<AccountInfo> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}.json",
            self.api_base, self.account_sid
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Twilio request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let account: TwilioAccountResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("failed to parse Twilio response: {e}")))?;

        Ok(AccountInfo {
            friendly_name: account.friendly_name,
            status: account.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(base: &str) -> TwilioWhatsAppChannel {
        TwilioWhatsAppChannel::new(
            "AC123".to_string(),
            "token".to_string(),
            "whatsapp:+14155238886".to_string(),
        )
        .with_api_base(base)
    }

    #[tokio::test]
    async fn send_posts_form_and_returns_receipt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("From".into(), "whatsapp:+14155238886".into()),
                mockito::Matcher::UrlEncoded("To".into(), "whatsapp:+1555".into()),
                mockito::Matcher::UrlEncoded("Body".into(), "Hello!".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"sid":"SM900","status":"queued"}"#)
            .create_async()
            .await;

        let receipt = channel(&server.url())
            .send("+1555", &OutboundContent::Text("Hello!".to_string()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(receipt.sid, "SM900");
        assert_eq!(receipt.status, "queued");
    }

    #[tokio::test]
    async fn send_surfaces_provider_error_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(400)
            .with_body(r#"{"code":21211,"message":"Invalid 'To' Phone Number"}"#)
            .create_async()
            .await;

        let err = channel(&server.url())
            .send("garbage", &OutboundContent::Text("hi".to_string()))
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Invalid 'To' Phone Number"), "{msg}");
        assert!(msg.contains("21211"), "{msg}");
    }

    #[tokio::test]
    async fn verify_fetches_account() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/2010-04-01/Accounts/AC123.json")
            .with_status(200)
            .with_body(r#"{"friendly_name":"Test Account","status":"active"}"#)
            .create_async()
            .await;

        let info = channel(&server.url()).verify().await.unwrap();
        assert_eq!(info.friendly_name, "Test Account");
        assert_eq!(info.status, "active");
    }
}
