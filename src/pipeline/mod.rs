//! Reply pipeline.
//!
//! Every webhook delivery flows through:
//! 1. `InboundEvent::from_raw()` — quick-reply tap, text, or ignorable
//! 2. `IntentResolver::resolve()` — greeting → keyword table → fallback
//! 3. `ReplyGateway::send()` — exactly one reply per answerable event
//!
//! The external collaborators (gateway, keyword table, user directory) are
//! traits so the pipeline can run against test doubles.

pub mod dispatcher;
pub mod resolver;
pub mod types;

pub use dispatcher::{DispatchSummary, EventDispatcher};
pub use resolver::{Intent, IntentResolver, Resolution};
pub use types::{
    EventKind, InboundEvent, KeywordReplyRow, KeywordSource, OutgoingMessage, ReplyGateway,
    StaticKeywordSource, UserDirectory, WebhookPayload,
};
