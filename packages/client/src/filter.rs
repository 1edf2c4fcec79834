//! City, day and free-text predicates over the loaded clubs.

use runclub_map_club_models::{ClubFeature, Language, Weekday};
use serde::{Deserialize, Serialize};

/// What the user is filtering on. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    /// Case-insensitive substring of the club's city.
    pub city: String,
    /// Day the club must run on.
    pub day: Option<Weekday>,
    /// Case-insensitive substring of name, city or description.
    pub search_text: String,
}

impl FilterState {
    /// Whether no predicate is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.city.trim().is_empty() && self.day.is_none() && self.search_text.trim().is_empty()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Whether `feature`'s schedule mentions `day` in either language.
///
/// Plain substring matching: "lundi" inside another word still counts.
#[must_use]
pub fn runs_on(feature: &ClubFeature, day: Weekday, language: Language) -> bool {
    let schedule = feature.properties.frequency_in(language).to_lowercase();
    day.tokens().iter().any(|token| schedule.contains(token))
}

/// Whether `feature` passes every active predicate of `state`.
#[must_use]
pub fn matches(feature: &ClubFeature, state: &FilterState, language: Language) -> bool {
    let props = &feature.properties;

    let city = state.city.trim().to_lowercase();
    if !city.is_empty() && !contains_ci(&props.city, &city) {
        return false;
    }

    if state.day.is_some_and(|day| !runs_on(feature, day, language)) {
        return false;
    }

    let text = state.search_text.trim().to_lowercase();
    if !text.is_empty()
        && !contains_ci(props.name_in(language), &text)
        && !contains_ci(&props.city, &text)
        && !contains_ci(props.description_in(language), &text)
    {
        return false;
    }

    true
}

/// The clubs passing `state`, in input order.
#[must_use]
pub fn filter(features: &[ClubFeature], state: &FilterState, language: Language) -> Vec<ClubFeature> {
    features
        .iter()
        .filter(|f| matches(f, state, language))
        .cloned()
        .collect()
}
