#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spreadsheet → `GeoJSON` pipeline for run clubs.
//!
//! Rows come from a [`RowSource`] (the Google Sheets API in production, a
//! CSV export or a static fixture otherwise). Each row is normalized into a
//! [`ClubFeature`](runclub_map_club_models::ClubFeature) by [`normalize`]
//! and the accepted rows are wrapped into a feature collection by
//! [`collection`].
//!
//! The sheet tab name is not known in advance (localized default names,
//! renamed tabs), so [`fetch_rows`] probes a fixed list of candidate
//! ranges and uses the first one that answers.

pub mod collection;
pub mod config;
pub mod csv_source;
pub mod google;
pub mod normalize;

use async_trait::async_trait;

/// Candidate ranges, highest priority first.
pub const DEFAULT_RANGES: &[&str] = &["Feuille1!A2:O", "Sheet1!A2:O", "Feuille 1!A2:O", "A2:O"];

/// One spreadsheet row: cell values in column order.
pub type RawRow = Vec<String>;

/// Errors that can occur while reading the spreadsheet.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The API rejected the range (unknown tab, bad syntax).
    #[error("Range '{range}' not found (HTTP {status})")]
    RangeNotFound {
        /// The range that was requested.
        range: String,
        /// HTTP status returned by the API.
        status: u16,
    },

    /// Credentials were refused.
    #[error("Sheets API refused credentials (HTTP {status})")]
    Unauthorized {
        /// HTTP status returned by the API.
        status: u16,
    },

    /// Any other non-success HTTP status.
    #[error("Sheets API returned HTTP {status}: {message}")]
    Status {
        /// HTTP status returned by the API.
        status: u16,
        /// Response body preview.
        message: String,
    },

    /// No candidate range returned data.
    #[error("No usable range found (tried: {})", tried.join(", "))]
    Unavailable {
        /// Every range that was attempted, in order.
        tried: Vec<String>,
    },

    /// Configuration is missing or malformed.
    #[error("Invalid configuration: {message}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        message: String,
    },
}

/// Something that can return the cell values of a spreadsheet range.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Returns every row in `range`. An existing but empty range is
    /// `Ok(vec![])`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError`] if the range cannot be read.
    async fn fetch_range(&self, range: &str) -> Result<Vec<RawRow>, SheetError>;

    /// Lists the sheet (tab) titles, when the source knows them.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError`] if the metadata request fails.
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError> {
        Ok(Vec::new())
    }
}

/// Rows read from the first candidate range that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRows {
    /// The range that succeeded.
    pub range: String,
    /// Its rows.
    pub rows: Vec<RawRow>,
}

/// Tries each candidate range in order and returns the first success.
///
/// The first range that answers wins even if it holds no rows. Sheet
/// titles are fetched first purely for diagnostics; a metadata failure is
/// logged and ignored.
///
/// # Errors
///
/// Returns [`SheetError::Unavailable`] if every candidate fails.
pub async fn fetch_rows(
    source: &dyn RowSource,
    candidates: &[String],
) -> Result<FetchedRows, SheetError> {
    match source.sheet_titles().await {
        Ok(titles) if !titles.is_empty() => log::info!("Available sheets: {titles:?}"),
        Ok(_) => {}
        Err(e) => log::warn!("Could not read spreadsheet metadata: {e}"),
    }

    let mut tried = Vec::with_capacity(candidates.len());

    for range in candidates {
        log::debug!("Trying range {range}");
        match source.fetch_range(range).await {
            Ok(rows) => {
                log::info!("Using range {range} ({} rows)", rows.len());
                return Ok(FetchedRows {
                    range: range.clone(),
                    rows,
                });
            }
            Err(e) => {
                log::warn!("Range {range} failed: {e}");
                tried.push(range.clone());
            }
        }
    }

    Err(SheetError::Unavailable { tried })
}

/// Returns [`DEFAULT_RANGES`] as owned strings.
#[must_use]
pub fn default_ranges() -> Vec<String> {
    DEFAULT_RANGES.iter().map(ToString::to_string).collect()
}

/// In-memory [`RowSource`] keyed by range name.
///
/// Ranges that were not registered fail with
/// [`SheetError::RangeNotFound`].
#[derive(Debug, Clone, Default)]
pub struct StaticRowSource {
    ranges: Vec<(String, Vec<RawRow>)>,
    titles: Vec<String>,
}

impl StaticRowSource {
    /// Creates a source with no ranges.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `rows` under `range`.
    #[must_use]
    pub fn with_range(mut self, range: &str, rows: Vec<RawRow>) -> Self {
        self.ranges.push((range.to_string(), rows));
        self
    }

    /// Sets the titles reported by [`RowSource::sheet_titles`].
    #[must_use]
    pub fn with_titles(mut self, titles: &[&str]) -> Self {
        self.titles = titles.iter().map(ToString::to_string).collect();
        self
    }
}

#[async_trait]
impl RowSource for StaticRowSource {
    async fn fetch_range(&self, range: &str) -> Result<Vec<RawRow>, SheetError> {
        self.ranges
            .iter()
            .find(|(name, _)| name == range)
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| SheetError::RangeNotFound {
                range: range.to_string(),
                status: 400,
            })
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError> {
        Ok(self.titles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn probes_ranges_in_priority_order() {
        let source = StaticRowSource::new()
            .with_range("A2:O", vec![row(&["fallback"])])
            .with_range("Sheet1!A2:O", vec![row(&["english tab"])]);

        let fetched = fetch_rows(&source, &default_ranges()).await.unwrap();
        assert_eq!(fetched.range, "Sheet1!A2:O");
        assert_eq!(fetched.rows, vec![row(&["english tab"])]);
    }

    #[tokio::test]
    async fn empty_range_still_wins() {
        let source = StaticRowSource::new()
            .with_range("Feuille1!A2:O", Vec::new())
            .with_range("A2:O", vec![row(&["ignored"])]);

        let fetched = fetch_rows(&source, &default_ranges()).await.unwrap();
        assert_eq!(fetched.range, "Feuille1!A2:O");
        assert!(fetched.rows.is_empty());
    }

    #[tokio::test]
    async fn reports_every_attempted_range_when_unavailable() {
        let source = StaticRowSource::new().with_titles(&["Clubs"]);
        let err = fetch_rows(&source, &default_ranges()).await.unwrap_err();
        match err {
            SheetError::Unavailable { tried } => assert_eq!(tried, default_ranges()),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
