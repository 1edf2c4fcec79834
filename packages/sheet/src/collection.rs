//! Builds the published [`FeatureCollection`] from spreadsheet rows.

use runclub_map_club_models::{FeatureCollection, SchemaVersion};

use crate::normalize::{RowRejected, normalize};
use crate::{RawRow, RowSource, fetch_rows};

/// Result of a build, with the rows that were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Accepted features, in input row order.
    pub collection: FeatureCollection,
    /// Every rejected row, in input row order.
    pub rejected: Vec<RowRejected>,
}

/// Normalizes every row and keeps those that pass, logging each
/// rejection.
#[must_use]
pub fn build_with_report(rows: &[RawRow], schema: SchemaVersion) -> BuildReport {
    let mut features = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match normalize(row, index, schema) {
            Ok(feature) => {
                if feature.properties.name.is_empty() {
                    log::warn!("Row {} has no club name", index + 2);
                }
                features.push(feature);
            }
            Err(e) => {
                log::warn!("Skipping sheet line {}: {e}", e.sheet_line());
                rejected.push(e);
            }
        }
    }

    log::debug!(
        "Built {} features from {} rows ({} rejected)",
        features.len(),
        rows.len(),
        rejected.len()
    );

    BuildReport {
        collection: FeatureCollection::new(features),
        rejected,
    }
}

/// Normalizes every row into a collection, dropping rejected rows.
#[must_use]
pub fn build(rows: &[RawRow], schema: SchemaVersion) -> FeatureCollection {
    build_with_report(rows, schema).collection
}

/// Fetches rows from `source` and builds the collection.
///
/// Never fails: if no candidate range can be read the error is logged and
/// an empty collection is returned.
pub async fn load_collection(
    source: &dyn RowSource,
    candidates: &[String],
    schema: SchemaVersion,
) -> FeatureCollection {
    match fetch_rows(source, candidates).await {
        Ok(fetched) => {
            if fetched.rows.is_empty() {
                log::warn!("Range {} holds no rows", fetched.range);
            }
            build(&fetched.rows, schema)
        }
        Err(e) => {
            log::error!("Row source unavailable, publishing no clubs: {e}");
            FeatureCollection::empty()
        }
    }
}
