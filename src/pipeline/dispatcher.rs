//! Event dispatcher — turns a webhook delivery into replies.
//!
//! Each messaging sub-event is classified, answered with exactly one reply
//! (or none, if ignorable), and handed to the gateway. Sub-events are handled
//! sequentially in delivery order. Nothing here returns an error: lookup
//! failures resolve to fallbacks and send failures are logged and counted.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::ReplyCatalog;
use crate::pipeline::resolver::IntentResolver;
use crate::pipeline::types::{
    EventKind, InboundEvent, OutgoingMessage, ReplyGateway, WebhookPayload,
};

/// Characters of reply text included in success logs.
const LOG_PREVIEW_CHARS: usize = 60;

/// Counters for one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Replies the gateway accepted.
    pub replied: usize,
    /// Sub-events that needed no reply.
    pub ignored: usize,
    /// Replies the gateway rejected.
    pub failed: usize,
}

/// Dispatches webhook deliveries to the resolver and the gateway.
pub struct EventDispatcher {
    catalog: Arc<ReplyCatalog>,
    resolver: IntentResolver,
    gateway: Arc<dyn ReplyGateway>,
}

impl EventDispatcher {
    pub fn new(
        catalog: Arc<ReplyCatalog>,
        resolver: IntentResolver,
        gateway: Arc<dyn ReplyGateway>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            gateway,
        }
    }

    /// Process every sub-event of a delivery.
    ///
    /// Non-page envelopes produce no replies.
    pub async fn dispatch(&self, payload: &WebhookPayload) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        if !payload.is_page_event() {
            debug!(object = %payload.object, "Ignoring non-page webhook delivery");
            return summary;
        }

        for raw in payload.entry.iter().flat_map(|e| e.messaging.iter()) {
            let event = InboundEvent::from_raw(raw);
            match self.reply_for(&event).await {
                Some(message) => {
                    if self.deliver(&message).await {
                        summary.replied += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                None => summary.ignored += 1,
            }
        }

        summary
    }

    /// Build the reply for one classified event, or `None` if it needs none.
    pub async fn reply_for(&self, event: &InboundEvent) -> Option<OutgoingMessage> {
        let text = match &event.kind {
            EventKind::Ignorable { reason } => {
                debug!(sender = %event.sender_id, reason, "Skipping event");
                return None;
            }
            EventKind::QuickReplyTap { payload } => {
                info!(sender = %event.sender_id, payload = %payload, "Quick reply tapped");
                self.catalog
                    .payload_reply(payload)
                    .unwrap_or(&self.catalog.fallback_message)
                    .to_string()
            }
            EventKind::Text { text } => {
                info!(sender = %event.sender_id, text = %text, "Message received");
                let resolution = self.resolver.resolve(&event.sender_id, text).await;
                debug!(
                    sender = %event.sender_id,
                    intent = resolution.intent.label(),
                    "Resolved reply"
                );
                resolution.text
            }
        };

        Some(
            OutgoingMessage::new(event.sender_id.clone(), text)
                .with_quick_replies(Arc::clone(&self.catalog.quick_replies)),
        )
    }

    /// Hand a reply to the gateway. Returns whether it was accepted.
    async fn deliver(&self, message: &OutgoingMessage) -> bool {
        match self.gateway.send(message).await {
            Ok(()) => {
                let preview: String = message.text.chars().take(LOG_PREVIEW_CHARS).collect();
                info!(recipient = %message.recipient_id, reply = %preview, "Replied");
                true
            }
            Err(e) => {
                error!(recipient = %message.recipient_id, error = %e, "Failed to send reply");
                false
            }
        }
    }
}
