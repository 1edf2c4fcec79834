//! Row → [`ClubFeature`] normalization.
//!
//! Columns are positional. The first thirteen are shared by every layout;
//! the social columns past index 12 depend on [`SchemaVersion`]. Missing
//! trailing cells (the Sheets API drops them) read as empty strings.

use runclub_map_club_models::{
    ClubFeature, ClubProperties, SchemaVersion, SocialLinks, SocialProvider,
};

const COL_NAME: usize = 0;
const COL_CITY: usize = 1;
const COL_FREQUENCY: usize = 2;
const COL_FREQUENCY_SECONDARY: usize = 3;
const COL_DESCRIPTION: usize = 4;
const COL_DESCRIPTION_SECONDARY: usize = 5;
const COL_IMAGE: usize = 6;
const COL_LATITUDE: usize = 7;
const COL_LONGITUDE: usize = 8;

const LEGACY_SOCIAL_COLUMNS: &[(usize, SocialProvider)] = &[
    (9, SocialProvider::Instagram),
    (10, SocialProvider::Facebook),
    (11, SocialProvider::Website),
    (12, SocialProvider::Tiktok),
    (13, SocialProvider::Linkedin),
];

const CURRENT_SOCIAL_COLUMNS: &[(usize, SocialProvider)] = &[
    (9, SocialProvider::Instagram),
    (10, SocialProvider::Facebook),
    (11, SocialProvider::Website),
    (12, SocialProvider::Tiktok),
    (13, SocialProvider::Whatsapp),
    (14, SocialProvider::Strava),
];

/// Column → provider table for `schema`.
#[must_use]
pub const fn social_columns(schema: SchemaVersion) -> &'static [(usize, SocialProvider)] {
    match schema {
        SchemaVersion::Legacy => LEGACY_SOCIAL_COLUMNS,
        SchemaVersion::Current => CURRENT_SOCIAL_COLUMNS,
    }
}

/// A row that could not become a feature.
///
/// Carries the raw and parsed coordinate values so the log line is
/// enough to fix the sheet.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "row {row_index} ({name:?}): invalid coordinates \
     (latitude {raw_latitude:?} -> {latitude:?}, longitude {raw_longitude:?} -> {longitude:?})"
)]
pub struct RowRejected {
    /// Zero-based index of the row within the fetched range.
    pub row_index: usize,
    /// Name cell, for context.
    pub name: String,
    /// Latitude cell as written.
    pub raw_latitude: String,
    /// Longitude cell as written.
    pub raw_longitude: String,
    /// Parsed latitude, `None` if the cell did not parse at all.
    pub latitude: Option<f64>,
    /// Parsed longitude, `None` if the cell did not parse at all.
    pub longitude: Option<f64>,
}

impl RowRejected {
    /// Line number in the spreadsheet UI (data starts below a header row).
    #[must_use]
    pub const fn sheet_line(&self) -> usize {
        self.row_index + 2
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map_or("", |s| s.trim())
}

/// Parses a coordinate cell. Accepts a decimal comma.
#[must_use]
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok()
}

/// Normalizes one spreadsheet row.
///
/// # Errors
///
/// Returns [`RowRejected`] if the latitude (column 7) or longitude
/// (column 8) is missing, does not parse, is non-finite or is out of
/// range. An empty name is accepted.
pub fn normalize(
    row: &[String],
    row_index: usize,
    schema: SchemaVersion,
) -> Result<ClubFeature, RowRejected> {
    let raw_latitude = cell(row, COL_LATITUDE);
    let raw_longitude = cell(row, COL_LONGITUDE);
    let latitude = parse_coordinate(raw_latitude);
    let longitude = parse_coordinate(raw_longitude);

    let rejected = || RowRejected {
        row_index,
        name: cell(row, COL_NAME).to_string(),
        raw_latitude: raw_latitude.to_string(),
        raw_longitude: raw_longitude.to_string(),
        latitude,
        longitude,
    };

    let (Some(lat), Some(lon)) = (latitude, longitude) else {
        return Err(rejected());
    };

    let mut social = SocialLinks::new();
    for &(column, provider) in social_columns(schema) {
        social.insert(provider, cell(row, column));
    }

    let properties = ClubProperties {
        name: cell(row, COL_NAME).to_string(),
        name_secondary: None,
        city: cell(row, COL_CITY).to_string(),
        frequency: cell(row, COL_FREQUENCY).to_string(),
        frequency_secondary: cell(row, COL_FREQUENCY_SECONDARY).to_string(),
        description: cell(row, COL_DESCRIPTION).to_string(),
        description_secondary: cell(row, COL_DESCRIPTION_SECONDARY).to_string(),
        image: cell(row, COL_IMAGE).to_string(),
        social,
    };

    ClubFeature::new(lon, lat, properties).map_err(|_| rejected())
}
