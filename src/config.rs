//! Configuration types.
//!
//! Everything here is built once at startup and shared read-only afterwards:
//! `ResponderConfig` carries the process settings and credentials, while
//! `ReplyCatalog` carries the canned replies, the quick-reply button set and
//! the greeting keywords.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default reply when nothing else matches.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Sorry, I didn't quite understand that. 😅 Please choose from the options below or contact us directly!";

/// Default welcome template. `{name}` is replaced with the sender's first name.
pub const DEFAULT_WELCOME_TEMPLATE: &str =
    "👋 Hi, {name}! How can we help you today? Choose an option below or type your question:";

/// Name used in the welcome message when the profile lookup yields nothing.
pub const FALLBACK_DISPLAY_NAME: &str = "there";

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com";
const DEFAULT_GRAPH_API_VERSION: &str = "v19.0";
const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_SHEETS_RANGE: &str = "Sheet1!A:B";

// ── Quick replies ───────────────────────────────────────────────────

/// A button rendered by the platform next to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReplyButton {
    /// Label shown to the user (the platform caps this at 20 characters).
    pub title: String,
    /// Opaque code sent back when the button is tapped.
    pub payload: String,
}

impl QuickReplyButton {
    pub fn new(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            payload: payload.into(),
        }
    }
}

// ── Reply catalog ───────────────────────────────────────────────────

/// Static reply configuration.
///
/// Can be loaded from a JSON file; any field left out keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyCatalog {
    /// Sent when neither a greeting nor a keyword matches.
    pub fallback_message: String,
    /// Welcome text; `{name}` is substituted.
    pub welcome_template: String,
    /// Substrings that trigger the welcome reply.
    pub greeting_keywords: Vec<String>,
    /// Buttons attached to every reply, in display order.
    pub quick_replies: Arc<[QuickReplyButton]>,
    /// Payload code → reply text for button taps.
    pub payload_replies: HashMap<String, String>,
}

impl Default for ReplyCatalog {
    fn default() -> Self {
        let quick_replies: Arc<[QuickReplyButton]> = Arc::from(vec![
            QuickReplyButton::new("💰 Pricing", "PRICE"),
            QuickReplyButton::new("🕐 Our Hours", "HOURS"),
            QuickReplyButton::new("📍 Location", "LOCATION"),
            QuickReplyButton::new("📞 Contact Us", "CONTACT"),
        ]);

        let payload_replies = [
            (
                "PRICE",
                "💰 Our pricing starts at $99/month. Visit our website at yourwebsite.com for full details!",
            ),
            (
                "HOURS",
                "🕐 We're open Monday to Friday, 9:00 AM – 6:00 PM.",
            ),
            (
                "LOCATION",
                "📍 You can find us at 123 Main Street, Manila. We'd love to see you!",
            ),
            (
                "CONTACT",
                "📞 You can reach us at hello@yourbusiness.com or call +63 900 000 0000.",
            ),
        ]
        .into_iter()
        .map(|(code, reply)| (code.to_string(), reply.to_string()))
        .collect();

        Self {
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            welcome_template: DEFAULT_WELCOME_TEMPLATE.to_string(),
            greeting_keywords: ["hi", "hello", "hey", "start", "help", "menu"]
                .into_iter()
                .map(String::from)
                .collect(),
            quick_replies,
            payload_replies,
        }
    }
}

impl ReplyCatalog {
    /// Load a catalog from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a catalog from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut catalog: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        catalog.greeting_keywords = catalog
            .greeting_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Ok(catalog)
    }

    /// Reply for a tapped button, if the payload code is known.
    pub fn payload_reply(&self, payload: &str) -> Option<&str> {
        self.payload_replies.get(payload).map(String::as_str)
    }

    /// Render the welcome message for `name`.
    pub fn welcome_for(&self, name: &str) -> String {
        self.welcome_template.replace("{name}", name)
    }

    /// Button payloads that have no entry in the payload table.
    ///
    /// Not enforced at runtime (taps on these fall back), but worth a warning
    /// at startup.
    pub fn missing_payloads(&self) -> Vec<&str> {
        self.quick_replies
            .iter()
            .map(|b| b.payload.as_str())
            .filter(|p| !self.payload_replies.contains_key(*p))
            .collect()
    }
}

// ── Process configuration ───────────────────────────────────────────

/// How the Sheets values API is authenticated.
#[derive(Debug, Clone)]
pub enum SheetsAuth {
    /// `key=` query parameter (works for link-shared sheets).
    ApiKey(SecretString),
    /// OAuth bearer token, e.g. minted for a service account.
    Bearer(SecretString),
}

/// Location of the keyword spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub api_base: String,
    pub spreadsheet_id: String,
    pub range: String,
    pub auth: Option<SheetsAuth>,
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Listen port for the webhook server.
    pub port: u16,
    /// Page access token used for the Send and profile APIs.
    pub page_access_token: SecretString,
    /// Token the platform echoes during webhook verification.
    pub verify_token: SecretString,
    /// Graph API host, without a trailing slash.
    pub graph_api_base: String,
    /// Graph API version segment for the Send API (e.g. `v19.0`).
    pub graph_api_version: String,
    /// Keyword spreadsheet, if one is configured.
    pub sheets: Option<SheetsConfig>,
    /// Optional JSON file overriding the default reply catalog.
    pub catalog_path: Option<PathBuf>,
}

impl ResponderConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".into(),
                message: format!("'{raw}' is not a valid port"),
            })?,
            None => DEFAULT_PORT,
        };

        let page_access_token = SecretString::from(require("PAGE_ACCESS_TOKEN")?);
        let verify_token = SecretString::from(require("VERIFY_TOKEN")?);

        let graph_api_base = get("GRAPH_API_BASE")
            .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let graph_api_version =
            get("GRAPH_API_VERSION").unwrap_or_else(|| DEFAULT_GRAPH_API_VERSION.to_string());

        let sheets = get("SPREADSHEET_ID").map(|spreadsheet_id| {
            let auth = get("SHEETS_ACCESS_TOKEN")
                .map(|t| SheetsAuth::Bearer(SecretString::from(t)))
                .or_else(|| {
                    get("SHEETS_API_KEY").map(|k| SheetsAuth::ApiKey(SecretString::from(k)))
                });
            SheetsConfig {
                api_base: get("SHEETS_API_BASE")
                    .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                spreadsheet_id,
                range: get("SHEETS_RANGE").unwrap_or_else(|| DEFAULT_SHEETS_RANGE.to_string()),
                auth,
            }
        });

        Ok(Self {
            port,
            page_access_token,
            verify_token,
            graph_api_base,
            graph_api_version,
            sheets,
            catalog_path: get("RESPONDER_CATALOG").map(PathBuf::from),
        })
    }

    /// Load the reply catalog: the configured file, or the built-in defaults.
    pub fn load_catalog(&self) -> Result<ReplyCatalog, ConfigError> {
        match &self.catalog_path {
            Some(path) => ReplyCatalog::from_file(path),
            None => Ok(ReplyCatalog::default()),
        }
    }
}
