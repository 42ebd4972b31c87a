//! Google Sheets keyword table.
//!
//! Reads a two-column range (keyword, reply) through the Sheets values API.
//! The first row is a header. Rows are fetched on every lookup so edits to the
//! sheet take effect without a restart.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::{SheetsAuth, SheetsConfig};
use crate::error::LookupError;
use crate::pipeline::types::{KeywordReplyRow, KeywordSource};

const SOURCE_NAME: &str = "google sheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Keyword source backed by a spreadsheet range.
pub struct SheetsKeywordSource {
    config: SheetsConfig,
    client: reqwest::Client,
}

impl SheetsKeywordSource {
    pub fn new(client: reqwest::Client, config: SheetsConfig) -> Self {
        Self { config, client }
    }

    /// `{api_base}/v4/spreadsheets/{id}/values/{range}`, with the id and range
    /// percent-encoded as path segments (sheet names may contain `#` or `?`).
    fn values_url(&self) -> Result<reqwest::Url, LookupError> {
        let invalid = |reason: String| LookupError::RequestFailed {
            source_name: SOURCE_NAME.into(),
            reason,
        };
        let mut url = reqwest::Url::parse(&self.config.api_base)
            .map_err(|e| invalid(format!("invalid API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| invalid("API base cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.as_str(), "values"])
            .push(&self.config.range);
        Ok(url)
    }
}

#[async_trait]
impl KeywordSource for SheetsKeywordSource {
    async fn list_keyword_replies(&self) -> Result<Vec<KeywordReplyRow>, LookupError> {
        let mut request = self.client.get(self.values_url()?);
        match &self.config.auth {
            Some(SheetsAuth::ApiKey(key)) => {
                request = request.query(&[("key", key.expose_secret())]);
            }
            Some(SheetsAuth::Bearer(token)) => {
                request = request.bearer_auth(token.expose_secret());
            }
            None => {}
        }

        let resp = request.send().await.map_err(|e| LookupError::RequestFailed {
            source_name: SOURCE_NAME.into(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(LookupError::RequestFailed {
                source_name: SOURCE_NAME.into(),
                reason: format!("{status}: {detail}"),
            });
        }

        let range: ValueRange = resp.json().await.map_err(|e| LookupError::InvalidResponse {
            source_name: SOURCE_NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(rows_from_values(range.values))
    }
}

/// Drop the header row and any row without both a keyword and a reply cell.
fn rows_from_values(values: Vec<Vec<String>>) -> Vec<KeywordReplyRow> {
    values
        .into_iter()
        .skip(1)
        .filter_map(|row| {
            let mut cells = row.into_iter();
            match (cells.next(), cells.next()) {
                (Some(keyword), Some(reply)) => Some(KeywordReplyRow { keyword, reply }),
                _ => None,
            }
        })
        .collect()
}
