//! Messenger platform adapters — Send API and user profile lookups.
//!
//! Both talk to the Graph API with the page access token. Neither retries.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{FALLBACK_DISPLAY_NAME, QuickReplyButton};
use crate::error::{ChannelError, LookupError};
use crate::pipeline::types::{OutgoingMessage, ReplyGateway, UserDirectory};

const CHANNEL_NAME: &str = "messenger";

// ── Send API wire format ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    recipient: Recipient<'a>,
    message: SendMessage<'a>,
    messaging_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quick_replies: Option<Vec<QuickReplyItem<'a>>>,
}

#[derive(Debug, Serialize)]
struct QuickReplyItem<'a> {
    content_type: &'static str,
    title: &'a str,
    payload: &'a str,
}

impl<'a> From<&'a QuickReplyButton> for QuickReplyItem<'a> {
    fn from(button: &'a QuickReplyButton) -> Self {
        Self {
            content_type: "text",
            title: &button.title,
            payload: &button.payload,
        }
    }
}

impl<'a> From<&'a OutgoingMessage> for SendRequest<'a> {
    fn from(message: &'a OutgoingMessage) -> Self {
        let quick_replies = message
            .quick_replies
            .as_deref()
            .filter(|buttons| !buttons.is_empty())
            .map(|buttons| buttons.iter().map(QuickReplyItem::from).collect());

        Self {
            recipient: Recipient {
                id: &message.recipient_id,
            },
            message: SendMessage {
                text: &message.text,
                quick_replies,
            },
            messaging_type: "RESPONSE",
        }
    }
}

// ── Send client ─────────────────────────────────────────────────────

/// Reply gateway backed by the Messenger Send API.
pub struct GraphSendClient {
    api_base: String,
    api_version: String,
    access_token: SecretString,
    client: reqwest::Client,
}

impl GraphSendClient {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        access_token: SecretString,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_version: api_version.into(),
            access_token,
            client,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/me/messages", self.api_base, self.api_version)
    }
}

#[async_trait]
impl ReplyGateway for GraphSendClient {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), ChannelError> {
        let body = SendRequest::from(message);

        let resp = self
            .client
            .post(self.messages_url())
            .query(&[("access_token", self.access_token.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("{status}: {detail}"),
            });
        }

        Ok(())
    }
}

// ── Profile lookup ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    first_name: Option<String>,
}

/// User directory backed by the Graph API profile endpoint.
pub struct GraphUserDirectory {
    api_base: String,
    access_token: SecretString,
    client: reqwest::Client,
}

impl GraphUserDirectory {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        access_token: SecretString,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            access_token,
            client,
        }
    }

    /// Fetch the sender's first name; `Ok(None)` if the profile has none.
    pub async fn fetch_first_name(&self, sender_id: &str) -> Result<Option<String>, LookupError> {
        let resp = self
            .client
            .get(format!("{}/{sender_id}", self.api_base))
            .query(&[
                ("fields", "first_name"),
                ("access_token", self.access_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| LookupError::RequestFailed {
                source_name: "graph profile".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::RequestFailed {
                source_name: "graph profile".into(),
                reason: format!("status {status}"),
            });
        }

        let profile: ProfileResponse =
            resp.json().await.map_err(|e| LookupError::InvalidResponse {
                source_name: "graph profile".into(),
                reason: e.to_string(),
            })?;

        Ok(profile
            .first_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()))
    }
}

#[async_trait]
impl UserDirectory for GraphUserDirectory {
    async fn resolve_display_name(&self, sender_id: &str) -> String {
        match self.fetch_first_name(sender_id).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!(sender = %sender_id, "Profile has no first name");
                FALLBACK_DISPLAY_NAME.to_string()
            }
            Err(e) => {
                warn!(sender = %sender_id, error = %e, "Could not fetch user name");
                FALLBACK_DISPLAY_NAME.to_string()
            }
        }
    }
}
