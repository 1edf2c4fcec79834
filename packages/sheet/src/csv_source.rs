//! [`RowSource`] over a CSV export of the club sheet.
//!
//! A CSV export only holds one tab, so every candidate range resolves to
//! the same rows. The header line is skipped, the way the `A2:O` ranges
//! skip it on the live sheet.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{RawRow, RowSource, SheetError};

/// Reads rows from a CSV file on every fetch.
#[derive(Debug, Clone)]
pub struct CsvRowSource {
    path: PathBuf,
}

impl CsvRowSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses CSV text (header first) into rows. Records may have different
/// lengths.
///
/// # Errors
///
/// Returns [`SheetError::Csv`] if the input is not valid CSV.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<RawRow>, SheetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok(rows)
}

#[async_trait]
impl RowSource for CsvRowSource {
    async fn fetch_range(&self, range: &str) -> Result<Vec<RawRow>, SheetError> {
        log::debug!("Reading {} for range {range}", self.path.display());
        let file = std::fs::File::open(&self.path)?;
        parse_csv(file)
    }
}
