#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Run club feature types.
//!
//! A club is published as a `GeoJSON` `Point` feature. The types in this
//! crate uphold the coordinate invariant at construction *and*
//! deserialization time: a [`ClubFeature`] can never hold a non-finite or
//! out-of-range position, so everything downstream (bounds, clustering,
//! the UI) can rely on it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Spreadsheet column layout in use by the data source.
///
/// Columns 0-12 mean the same thing in every layout; the two versions
/// disagree on what columns 13 and 14 hold.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SchemaVersion {
    /// Column 13 is `LinkedIn`, there is no column 14.
    Legacy,
    /// Column 13 is `WhatsApp`, column 14 is Strava.
    #[default]
    Current,
}

/// A social network (or plain website) a club can link to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SocialProvider {
    /// Club website.
    Website,
    /// Instagram profile.
    Instagram,
    /// Facebook page.
    Facebook,
    /// `TikTok` account.
    Tiktok,
    /// `LinkedIn` page (legacy layout only).
    Linkedin,
    /// `WhatsApp` group link.
    Whatsapp,
    /// Strava club.
    Strava,
}

/// Sparse map of provider → URL.
///
/// The sheet pipeline fills every provider of its schema version, using an
/// empty string for blank cells. Readers should go through [`Self::get`],
/// which treats an empty value and a missing key the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocialLinks(BTreeMap<SocialProvider, String>);

impl SocialLinks {
    /// Creates an empty link map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Stores the raw (trimmed) cell value for `provider`.
    pub fn insert(&mut self, provider: SocialProvider, url: impl Into<String>) {
        self.0.insert(provider, url.into().trim().to_string());
    }

    /// Returns the link for `provider`, or `None` if absent or blank.
    #[must_use]
    pub fn get(&self, provider: SocialProvider) -> Option<&str> {
        self.0
            .get(&provider)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }

    /// Returns the stored value for `provider` exactly as written,
    /// including empty strings.
    #[must_use]
    pub fn raw(&self, provider: SocialProvider) -> Option<&str> {
        self.0.get(&provider).map(String::as_str)
    }

    /// Iterates over the providers that have a non-empty link.
    pub fn present(&self) -> impl Iterator<Item = (SocialProvider, &str)> {
        self.0
            .iter()
            .filter(|(_, url)| !url.is_empty())
            .map(|(provider, url)| (*provider, url.as_str()))
    }

    /// Number of stored keys, blank values included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no key is stored at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which of the two translated text columns to read.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
    /// The sheet's primary language (French in production).
    #[default]
    #[strum(to_string = "primary", serialize = "fr")]
    Primary,
    /// The translated columns (English in production).
    #[strum(to_string = "secondary", serialize = "en")]
    Secondary,
}

/// Canonical day of the week used by the day filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Weekday {
    /// Monday / lundi.
    Monday,
    /// Tuesday / mardi.
    Tuesday,
    /// Wednesday / mercredi.
    Wednesday,
    /// Thursday / jeudi.
    Thursday,
    /// Friday / vendredi.
    Friday,
    /// Saturday / samedi.
    Saturday,
    /// Sunday / dimanche.
    Sunday,
}

impl Weekday {
    /// Lowercase day names, in both languages, that select this day.
    #[must_use]
    pub const fn tokens(self) -> &'static [&'static str] {
        match self {
            Self::Monday => &["lundi", "monday"],
            Self::Tuesday => &["mardi", "tuesday"],
            Self::Wednesday => &["mercredi", "wednesday"],
            Self::Thursday => &["jeudi", "thursday"],
            Self::Friday => &["vendredi", "friday"],
            Self::Saturday => &["samedi", "saturday"],
            Self::Sunday => &["dimanche", "sunday"],
        }
    }

    /// Resolves a day name in either language (case-insensitive).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_lowercase();
        <Self as strum::IntoEnumIterator>::iter().find(|day| day.tokens().contains(&token.as_str()))
    }
}

/// Why a position cannot become a [`ClubFeature`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum InvalidCoordinates {
    /// Latitude or longitude is `NaN` or infinite.
    #[error("non-finite coordinates (lon {longitude}, lat {latitude})")]
    NonFinite {
        /// Longitude as given.
        longitude: f64,
        /// Latitude as given.
        latitude: f64,
    },
    /// Finite but outside the WGS84 range.
    #[error("coordinates out of range (lon {longitude}, lat {latitude})")]
    OutOfRange {
        /// Longitude as given.
        longitude: f64,
        /// Latitude as given.
        latitude: f64,
    },
}

/// Validates a WGS84 position.
///
/// # Errors
///
/// Returns [`InvalidCoordinates`] if either value is non-finite or out of
/// range.
pub fn validate_position(longitude: f64, latitude: f64) -> Result<(), InvalidCoordinates> {
    if !longitude.is_finite() || !latitude.is_finite() {
        return Err(InvalidCoordinates::NonFinite {
            longitude,
            latitude,
        });
    }
    if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
        return Err(InvalidCoordinates::OutOfRange {
            longitude,
            latitude,
        });
    }
    Ok(())
}

/// Content-derived identity of a feature: name plus coordinates.
///
/// Used to link list entries to map markers and popups. Array positions
/// are not stable across filtering, this is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    /// Builds the identity for a club at the given position.
    #[must_use]
    pub fn new(name: &str, longitude: f64, latitude: f64) -> Self {
        Self(format!("{}@{latitude:.6},{longitude:.6}", name.trim()))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive fields of a club.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubProperties {
    /// Club name. May be empty, which callers should treat as a data
    /// quality warning.
    pub name: String,
    /// Translated name, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_secondary: Option<String>,
    /// City the club runs in.
    #[serde(default)]
    pub city: String,
    /// Free-text schedule, primary language.
    #[serde(default)]
    pub frequency: String,
    /// Free-text schedule, secondary language.
    #[serde(default)]
    pub frequency_secondary: String,
    /// Description, primary language.
    #[serde(default)]
    pub description: String,
    /// Description, secondary language.
    #[serde(default)]
    pub description_secondary: String,
    /// Image URL or bare file name.
    #[serde(default)]
    pub image: String,
    /// Social and website links.
    #[serde(default)]
    pub social: SocialLinks,
}

impl ClubProperties {
    /// Name in `language`, falling back to the primary name.
    #[must_use]
    pub fn name_in(&self, language: Language) -> &str {
        match language {
            Language::Primary => &self.name,
            Language::Secondary => self
                .name_secondary
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(&self.name),
        }
    }

    /// Schedule text in `language`, falling back to the primary text.
    #[must_use]
    pub fn frequency_in(&self, language: Language) -> &str {
        localized(&self.frequency, &self.frequency_secondary, language)
    }

    /// Description in `language`, falling back to the primary text.
    #[must_use]
    pub fn description_in(&self, language: Language) -> &str {
        localized(&self.description, &self.description_secondary, language)
    }
}

fn localized<'a>(primary: &'a str, secondary: &'a str, language: Language) -> &'a str {
    match language {
        Language::Secondary if !secondary.trim().is_empty() => secondary,
        _ => primary,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum FeatureKind {
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum PointKind {
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum CollectionKind {
    FeatureCollection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PointGeometry {
    #[serde(rename = "type")]
    kind: PointKind,
    /// `[longitude, latitude]`
    coordinates: [f64; 2],
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(rename = "type")]
    _kind: FeatureKind,
    geometry: PointGeometry,
    properties: ClubProperties,
}

/// A club as a `GeoJSON` `Point` feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFeature")]
pub struct ClubFeature {
    #[serde(rename = "type")]
    kind: FeatureKind,
    geometry: PointGeometry,
    /// Descriptive fields.
    pub properties: ClubProperties,
}

impl TryFrom<RawFeature> for ClubFeature {
    type Error = InvalidCoordinates;

    fn try_from(raw: RawFeature) -> Result<Self, Self::Error> {
        let [longitude, latitude] = raw.geometry.coordinates;
        Self::new(longitude, latitude, raw.properties)
    }
}

impl ClubFeature {
    /// Creates a feature at `(longitude, latitude)`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinates`] if the position is non-finite or out
    /// of range. Positions are never defaulted.
    pub fn new(
        longitude: f64,
        latitude: f64,
        properties: ClubProperties,
    ) -> Result<Self, InvalidCoordinates> {
        validate_position(longitude, latitude)?;
        Ok(Self {
            kind: FeatureKind::Feature,
            geometry: PointGeometry {
                kind: PointKind::Point,
                coordinates: [longitude, latitude],
            },
            properties,
        })
    }

    /// `[longitude, latitude]`, in `GeoJSON` order.
    #[must_use]
    pub const fn coordinates(&self) -> [f64; 2] {
        self.geometry.coordinates
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.geometry.coordinates[1]
    }

    /// Content-derived identity (name + coordinates).
    #[must_use]
    pub fn stable_id(&self) -> StableId {
        StableId::new(&self.properties.name, self.longitude(), self.latitude())
    }
}

/// `GeoJSON` envelope holding every published club.
///
/// Always well formed; "no clubs" is an empty `features` array, never an
/// error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: CollectionKind,
    /// Features in source row order.
    pub features: Vec<ClubFeature>,
}

impl FeatureCollection {
    /// Wraps `features` in a collection envelope.
    #[must_use]
    pub const fn new(features: Vec<ClubFeature>) -> Self {
        Self {
            kind: CollectionKind::FeatureCollection,
            features,
        }
    }

    /// The empty collection.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::empty()
    }
}
