//! Google Sheets API v4 row source.
//!
//! See <https://developers.google.com/sheets/api/reference/rest/v4/spreadsheets.values/get>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};

use crate::config::{Credentials, SheetConfig};
use crate::{RawRow, RowSource, SheetError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 300;

/// Reads club rows over the Sheets REST API.
pub struct GoogleSheetsClient {
    client: reqwest::Client,
    config: SheetConfig,
}

impl GoogleSheetsClient {
    /// Creates a client for the spreadsheet described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::ConfigInvalid`] if the API base URL does not
    /// parse, or [`SheetError::Http`] if the HTTP client cannot be built.
    pub fn new(config: SheetConfig) -> Result<Self, SheetError> {
        Url::parse(&config.api_base).map_err(|e| SheetError::ConfigInvalid {
            message: format!("invalid Sheets API base '{}': {e}", config.api_base),
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, config })
    }

    /// The configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &SheetConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SheetError> {
        let mut url = Url::parse(&self.config.api_base).map_err(|e| SheetError::ConfigInvalid {
            message: format!("invalid Sheets API base: {e}"),
        })?;
        url.path_segments_mut()
            .map_err(|()| SheetError::ConfigInvalid {
                message: "Sheets API base cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.config.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Credentials::ApiKey(key) => request.query(&[("key", key.as_str())]),
            Credentials::AccessToken(token) => request.bearer_auth(token),
        }
    }

    async fn get_json(
        &self,
        url: Url,
        range: Option<&str>,
    ) -> Result<serde_json::Value, SheetError> {
        let resp = self.authorize(self.client.get(url)).send().await?;
        let status = resp.status();

        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let message: String = body.chars().take(BODY_PREVIEW_LEN).collect();

        Err(match (status, range) {
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => SheetError::Unauthorized {
                status: status.as_u16(),
            },
            (StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND, Some(range)) => {
                SheetError::RangeNotFound {
                    range: range.to_string(),
                    status: status.as_u16(),
                }
            }
            _ => SheetError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl RowSource for GoogleSheetsClient {
    async fn fetch_range(&self, range: &str) -> Result<Vec<RawRow>, SheetError> {
        let url = self.url(&["values", range])?;
        let body = self.get_json(url, Some(range)).await?;
        Ok(parse_values(&body))
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let body = self.get_json(url, None).await?;
        Ok(parse_titles(&body))
    }
}

/// Converts a `ValueRange` body into rows of strings.
///
/// A missing `values` array is an empty range. Non-string cells are
/// rendered with their JSON text, `null` becomes an empty string.
#[must_use]
pub fn parse_values(body: &serde_json::Value) -> Vec<RawRow> {
    let Some(rows) = body["values"].as_array() else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_to_string).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_titles(body: &serde_json::Value) -> Vec<String> {
    body["sheets"]
        .as_array()
        .map(|sheets| {
            sheets
                .iter()
                .filter_map(|s| s["properties"]["title"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
