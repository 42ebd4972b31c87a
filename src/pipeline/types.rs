//! Shared types for the reply pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::QuickReplyButton;
use crate::error::{ChannelError, LookupError};

// ── Webhook envelope ────────────────────────────────────────────────

/// A webhook delivery as posted by the platform.
///
/// Every field is optional on the wire; anything missing classifies as
/// ignorable instead of failing the whole delivery. Sub-events are kept as raw
/// JSON and parsed one at a time, so a malformed one is skipped on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Must be `"page"` for the delivery to be processed.
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

impl WebhookPayload {
    pub fn is_page_event(&self) -> bool {
        self.object == "page"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub messaging: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply: Option<QuickReplyTap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickReplyTap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

// ── Inbound event ───────────────────────────────────────────────────

/// What a single messaging sub-event asks of us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The user tapped a quick-reply button.
    QuickReplyTap { payload: String },
    /// The user typed something.
    Text { text: String },
    /// Nothing to answer (echo, attachment, no body).
    Ignorable { reason: &'static str },
}

impl EventKind {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::QuickReplyTap { .. } => "quick_reply",
            Self::Text { .. } => "text",
            Self::Ignorable { .. } => "ignorable",
        }
    }
}

/// A classified inbound event, built once per sub-event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender_id: String,
    pub kind: EventKind,
}

impl InboundEvent {
    /// Parse and classify one raw sub-event from a delivery.
    ///
    /// A sub-event that does not match the expected shape is ignorable.
    pub fn from_raw(raw: &serde_json::Value) -> Self {
        match MessagingEvent::deserialize(raw) {
            Ok(event) => Self::classify(&event),
            Err(e) => {
                debug!(error = %e, "Malformed messaging event");
                Self {
                    sender_id: raw["sender"]["id"].as_str().unwrap_or_default().to_string(),
                    kind: EventKind::Ignorable {
                        reason: "malformed event",
                    },
                }
            }
        }
    }

    /// Classify a messaging sub-event.
    ///
    /// Check order: missing sender → missing body → echo → quick-reply tap → text → ignore.
    pub fn classify(event: &MessagingEvent) -> Self {
        let sender_id = event
            .sender
            .as_ref()
            .map(|s| s.id.trim().to_string())
            .unwrap_or_default();

        let kind = match &event.message {
            _ if sender_id.is_empty() => EventKind::Ignorable {
                reason: "missing sender id",
            },
            None => EventKind::Ignorable {
                reason: "no message body",
            },
            Some(msg) if msg.is_echo => EventKind::Ignorable {
                reason: "echo of our own message",
            },
            Some(MessageBody {
                quick_reply: Some(tap),
                ..
            }) => EventKind::QuickReplyTap {
                payload: tap.payload.clone().unwrap_or_default(),
            },
            Some(MessageBody {
                text: Some(text), ..
            }) if !text.is_empty() => EventKind::Text {
                text: text.trim().to_string(),
            },
            Some(_) => EventKind::Ignorable {
                reason: "no text or quick reply",
            },
        };

        Self { sender_id, kind }
    }
}

// ── Keyword rows ────────────────────────────────────────────────────

/// One row of the external keyword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordReplyRow {
    pub keyword: String,
    pub reply: String,
}

impl KeywordReplyRow {
    pub fn new(keyword: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            reply: reply.into(),
        }
    }
}

// ── Outgoing message ────────────────────────────────────────────────

/// A reply ready for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipient_id: String,
    pub text: String,
    /// Shared button set; `None` sends plain text.
    pub quick_replies: Option<Arc<[QuickReplyButton]>>,
}

impl OutgoingMessage {
    pub fn new(recipient_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            text: text.into(),
            quick_replies: None,
        }
    }

    pub fn with_quick_replies(mut self, buttons: Arc<[QuickReplyButton]>) -> Self {
        self.quick_replies = Some(buttons);
        self
    }
}

// ── Capability traits ───────────────────────────────────────────────

/// Delivers replies to the platform.
#[async_trait]
pub trait ReplyGateway: Send + Sync {
    /// Send one message. Callers log failures and move on.
    async fn send(&self, message: &OutgoingMessage) -> Result<(), ChannelError>;
}

/// Supplies keyword → reply rows, in source order.
#[async_trait]
pub trait KeywordSource: Send + Sync {
    async fn list_keyword_replies(&self) -> Result<Vec<KeywordReplyRow>, LookupError>;
}

/// Resolves a sender id to a display name.
///
/// Implementations never fail: any lookup problem resolves to
/// [`FALLBACK_DISPLAY_NAME`](crate::config::FALLBACK_DISPLAY_NAME).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_display_name(&self, sender_id: &str) -> String;
}

/// In-memory keyword table.
#[derive(Debug, Clone, Default)]
pub struct StaticKeywordSource {
    rows: Vec<KeywordReplyRow>,
}

impl StaticKeywordSource {
    pub fn new(rows: Vec<KeywordReplyRow>) -> Self {
        Self { rows }
    }

    /// A source with no rows.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeywordSource for StaticKeywordSource {
    async fn list_keyword_replies(&self) -> Result<Vec<KeywordReplyRow>, LookupError> {
        Ok(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> WebhookPayload {
        serde_json::from_str(raw).unwrap()
    }

    fn first_event(payload: &WebhookPayload) -> InboundEvent {
        InboundEvent::from_raw(&payload.entry[0].messaging[0])
    }

    #[test]
    fn classifies_text_message() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"message":{"text":"  Hello there  "}}]}]}"#,
        );
        assert!(payload.is_page_event());
        let event = first_event(&payload);
        assert_eq!(event.sender_id, "42");
        assert_eq!(
            event.kind,
            EventKind::Text {
                text: "Hello there".into()
            }
        );
    }

    #[test]
    fn quick_reply_wins_over_text() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"message":{"text":"💰 Pricing","quick_reply":{"payload":"PRICE"}}}]}]}"#,
        );
        assert_eq!(
            first_event(&payload).kind,
            EventKind::QuickReplyTap {
                payload: "PRICE".into()
            }
        );
    }

    #[test]
    fn echo_is_ignorable_even_with_quick_reply() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"page"},"message":{"is_echo":true,"text":"hi","quick_reply":{"payload":"PRICE"}}}]}]}"#,
        );
        assert!(matches!(
            first_event(&payload).kind,
            EventKind::Ignorable { .. }
        ));
    }

    #[test]
    fn missing_message_is_ignorable() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"delivery":{"watermark":1}}]}]}"#,
        );
        assert_eq!(
            first_event(&payload).kind,
            EventKind::Ignorable {
                reason: "no message body"
            }
        );
    }

    #[test]
    fn attachment_only_is_ignorable() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"message":{"attachments":[{"type":"image"}]}}]}]}"#,
        );
        assert_eq!(first_event(&payload).kind.label(), "ignorable");
    }

    #[test]
    fn whitespace_text_still_answered() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"message":{"text":"   "}}]}]}"#,
        );
        assert_eq!(
            first_event(&payload).kind,
            EventKind::Text {
                text: String::new()
            }
        );
    }

    #[test]
    fn empty_text_is_ignorable() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"message":{"text":""}}]}]}"#,
        );
        assert_eq!(first_event(&payload).kind.label(), "ignorable");
    }

    #[test]
    fn malformed_event_is_ignorable_alone() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[
                {"sender":{"id":"7"},"message":{"text":null,"is_echo":null}},
                {"sender":{"id":99},"message":{"text":"hi"}},
                {"sender":{"id":"42"},"message":{"text":"hi"}}
            ]}]}"#,
        );
        let kinds: Vec<EventKind> = payload.entry[0]
            .messaging
            .iter()
            .map(|raw| InboundEvent::from_raw(raw).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Ignorable {
                    reason: "malformed event"
                },
                EventKind::Ignorable {
                    reason: "malformed event"
                },
                EventKind::Text { text: "hi".into() },
            ]
        );
        assert_eq!(
            InboundEvent::from_raw(&payload.entry[0].messaging[0]).sender_id,
            "7"
        );
    }

    #[test]
    fn missing_sender_is_ignorable() {
        let payload =
            parse(r#"{"object":"page","entry":[{"messaging":[{"message":{"text":"hi"}}]}]}"#);
        assert_eq!(
            first_event(&payload).kind,
            EventKind::Ignorable {
                reason: "missing sender id"
            }
        );
    }

    #[test]
    fn quick_reply_without_payload_keeps_empty_code() {
        let payload = parse(
            r#"{"object":"page","entry":[{"messaging":[{"sender":{"id":"42"},"message":{"quick_reply":{}}}]}]}"#,
        );
        assert_eq!(
            first_event(&payload).kind,
            EventKind::QuickReplyTap {
                payload: String::new()
            }
        );
    }

    #[test]
    fn non_page_object_detected() {
        let payload = parse(r#"{"object":"instagram","entry":[]}"#);
        assert!(!payload.is_page_event());
        assert!(!WebhookPayload::default().is_page_event());
    }

    #[test]
    fn outgoing_message_builder() {
        let buttons: Arc<[QuickReplyButton]> =
            Arc::from(vec![QuickReplyButton::new("Hours", "HOURS")]);
        let msg = OutgoingMessage::new("42", "hello").with_quick_replies(Arc::clone(&buttons));
        assert_eq!(msg.recipient_id, "42");
        assert!(Arc::ptr_eq(msg.quick_replies.as_ref().unwrap(), &buttons));
    }

    #[tokio::test]
    async fn static_source_returns_rows_in_order() {
        let source = StaticKeywordSource::new(vec![
            KeywordReplyRow::new("price", "a"),
            KeywordReplyRow::new("hours", "b"),
        ]);
        let rows = source.list_keyword_replies().await.unwrap();
        assert_eq!(rows[0].keyword, "price");
        assert_eq!(rows[1].keyword, "hours");
        assert!(
            StaticKeywordSource::empty()
                .list_keyword_replies()
                .await
                .unwrap()
                .is_empty()
        );
    }
}
