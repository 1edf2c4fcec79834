//! Spreadsheet access configuration.
//!
//! Built once at startup and handed to [`GoogleSheetsClient::new`]
//! (see [`crate::google`]); nothing here is global.
//!
//! [`GoogleSheetsClient::new`]: crate::google::GoogleSheetsClient::new

use runclub_map_club_models::SchemaVersion;

use crate::{SheetError, default_ranges};

/// Default Sheets REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// How requests to the Sheets API are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Public-sheet API key, sent as the `key` query parameter.
    ApiKey(String),
    /// `OAuth2` access token, sent as a bearer token.
    AccessToken(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
        }
    }
}

/// Everything needed to read club rows from a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetConfig {
    /// Spreadsheet document ID.
    pub spreadsheet_id: String,
    /// How to authorize.
    pub credentials: Credentials,
    /// Column layout of the sheet.
    pub schema: SchemaVersion,
    /// Candidate ranges, tried in order.
    pub ranges: Vec<String>,
    /// Sheets API base URL.
    pub api_base: String,
}

impl SheetConfig {
    /// Reads the configuration from the process environment.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `SPREADSHEET_ID` | document ID (required) |
    /// | `GOOGLE_SHEETS_API_KEY` | API key |
    /// | `GOOGLE_SHEETS_ACCESS_TOKEN` | bearer token, used if no key is set |
    /// | `SHEET_SCHEMA` | `legacy` or `current` (default `current`) |
    /// | `SHEET_RANGES` | comma-separated candidate ranges |
    /// | `SHEETS_API_BASE` | API base URL |
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::ConfigInvalid`] if a required variable is
    /// missing or a value does not parse.
    pub fn from_env() -> Result<Self, SheetError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::ConfigInvalid`] if a required variable is
    /// missing or a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SheetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let spreadsheet_id = non_empty("SPREADSHEET_ID").ok_or_else(|| SheetError::ConfigInvalid {
            message: "SPREADSHEET_ID environment variable not set".to_string(),
        })?;

        let credentials = if let Some(key) = non_empty("GOOGLE_SHEETS_API_KEY") {
            Credentials::ApiKey(key)
        } else if let Some(token) = non_empty("GOOGLE_SHEETS_ACCESS_TOKEN") {
            Credentials::AccessToken(token)
        } else {
            return Err(SheetError::ConfigInvalid {
                message: "set GOOGLE_SHEETS_API_KEY or GOOGLE_SHEETS_ACCESS_TOKEN".to_string(),
            });
        };

        let schema = match non_empty("SHEET_SCHEMA") {
            Some(value) => value.parse().map_err(|_| SheetError::ConfigInvalid {
                message: format!("SHEET_SCHEMA must be 'legacy' or 'current', got '{value}'"),
            })?,
            None => SchemaVersion::default(),
        };

        let ranges = non_empty("SHEET_RANGES").map_or_else(default_ranges, |value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect()
        });
        if ranges.is_empty() {
            return Err(SheetError::ConfigInvalid {
                message: "SHEET_RANGES lists no ranges".to_string(),
            });
        }

        let api_base = non_empty("SHEETS_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            spreadsheet_id,
            credentials,
            schema,
            ranges,
            api_base,
        })
    }
}
