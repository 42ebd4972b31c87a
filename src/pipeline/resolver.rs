//! Intent resolver — picks the reply for a typed message.
//!
//! Rules run in a fixed order and the first match wins:
//! 1. Greeting keywords → personalized welcome (user directory lookup)
//! 2. Keyword table → first row whose keyword appears in the text
//! 3. Fallback message
//!
//! Greetings are checked before the keyword table, so "hi, what's the price?"
//! gets the welcome reply.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{FALLBACK_DISPLAY_NAME, ReplyCatalog};
use crate::pipeline::types::{KeywordReplyRow, KeywordSource, UserDirectory};

/// Which rule produced a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting { name: String },
    Keyword { keyword: String },
    Fallback,
}

impl Intent {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Greeting { .. } => "greeting",
            Self::Keyword { .. } => "keyword",
            Self::Fallback => "fallback",
        }
    }
}

/// A resolved reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub intent: Intent,
    pub text: String,
}

/// Resolves typed text to a single reply.
pub struct IntentResolver {
    catalog: Arc<ReplyCatalog>,
    keywords: Arc<dyn KeywordSource>,
    directory: Arc<dyn UserDirectory>,
}

impl IntentResolver {
    pub fn new(
        catalog: Arc<ReplyCatalog>,
        keywords: Arc<dyn KeywordSource>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            catalog,
            keywords,
            directory,
        }
    }

    /// Resolve the reply for `text` sent by `sender_id`. Never fails.
    pub async fn resolve(&self, sender_id: &str, text: &str) -> Resolution {
        let normalized = text.trim().to_lowercase();

        if self.is_greeting(&normalized) {
            let name = self.display_name(sender_id).await;
            return Resolution {
                text: self.catalog.welcome_for(&name),
                intent: Intent::Greeting { name },
            };
        }

        if let Some((keyword, reply)) = self.lookup_keyword(&normalized).await {
            return Resolution {
                intent: Intent::Keyword { keyword },
                text: reply,
            };
        }

        Resolution {
            intent: Intent::Fallback,
            text: self.catalog.fallback_message.clone(),
        }
    }

    /// Keywords are normalized here too, so catalogs built in code match the
    /// same way as ones loaded from JSON.
    fn is_greeting(&self, normalized: &str) -> bool {
        self.catalog.greeting_keywords.iter().any(|k| {
            let k = k.trim().to_lowercase();
            !k.is_empty() && normalized.contains(&k)
        })
    }

    async fn display_name(&self, sender_id: &str) -> String {
        let name = self.directory.resolve_display_name(sender_id).await;
        let name = name.trim();
        if name.is_empty() {
            FALLBACK_DISPLAY_NAME.to_string()
        } else {
            name.to_string()
        }
    }

    async fn lookup_keyword(&self, normalized: &str) -> Option<(String, String)> {
        let rows = match self.keywords.list_keyword_replies().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Keyword lookup failed; treating as no match");
                return None;
            }
        };

        let (keyword, reply) = first_keyword_match(&rows, normalized)?;
        if reply.is_empty() {
            debug!(keyword = %keyword, "Matched keyword row has an empty reply");
            return None;
        }
        Some((keyword, reply))
    }
}

/// First row, in source order, whose keyword is a substring of `normalized`.
///
/// Returns the normalized keyword and the trimmed reply.
fn first_keyword_match(rows: &[KeywordReplyRow], normalized: &str) -> Option<(String, String)> {
    rows.iter().find_map(|row| {
        let keyword = row.keyword.trim().to_lowercase();
        (!keyword.is_empty() && normalized.contains(&keyword))
            .then(|| (keyword, row.reply.trim().to_string()))
    })
}
