//! Orchestration of loading, filtering, viewport and markers.
//!
//! The controller owns the loaded clubs (immutable after a load), the
//! filter state, the viewport and the current [`RenderPlan`]. Every
//! change derives a new plan and returns the [`PlanDiff`] from the
//! previous one, which is all a drawing layer needs to apply.

use std::collections::BTreeMap;
use std::sync::Arc;

use runclub_map_cache::{CacheOptions, keys};
use runclub_map_club_models::{ClubFeature, Language, StableId};
use runclub_map_spatial::bounds::{FitOptions, GeoBounds, MapView, fit_bounds, initial_view};
use runclub_map_spatial::cluster::{ClusterEngine, ExpandAction, NodeKey, RenderPlan};
use runclub_map_spatial::icon::ImageFailures;
use runclub_map_spatial::projection::{LatLng, Viewport};
use runclub_map_spatial::reconcile::{PlanDiff, diff};
use runclub_map_spatial::spiderfy::SpiderLeg;
use serde::{Deserialize, Serialize};

use crate::filter::{FilterState, filter};
use crate::loader::{DataLoader, LoadError, Loaded};

/// Where the controller is in its data lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A load is in flight.
    Loading,
    /// Clubs are available (possibly zero).
    Loaded {
        /// Number of clubs loaded.
        count: usize,
        /// Whether they came from the cache.
        from_cache: bool,
    },
}

/// Preferences persisted across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Display language.
    pub language: Language,
}

/// Drives one map view.
#[derive(Debug)]
pub struct ViewController {
    loader: Arc<DataLoader>,
    engine: ClusterEngine,
    fit: FitOptions,
    status: LoadStatus,
    features: Vec<ClubFeature>,
    visible: Vec<ClubFeature>,
    filter: FilterState,
    language: Language,
    viewport: Viewport,
    plan: RenderPlan,
    failures: ImageFailures,
    popup: Option<StableId>,
    spider: Option<(NodeKey, Vec<SpiderLeg>)>,
}

impl ViewController {
    /// Creates a controller for a `width` × `height` map, at the default
    /// view and with the stored language preference.
    #[must_use]
    pub fn new(
        loader: Arc<DataLoader>,
        engine: ClusterEngine,
        fit: FitOptions,
        width: f64,
        height: f64,
    ) -> Self {
        let language = loader
            .cache()
            .get::<UserPreferences>(keys::USER_PREFERENCES, &CacheOptions::user_preferences())
            .map(|prefs| prefs.language)
            .unwrap_or_default();
        let view = MapView::default();

        Self {
            loader,
            engine,
            fit,
            status: LoadStatus::Idle,
            features: Vec::new(),
            visible: Vec::new(),
            filter: FilterState::default(),
            language,
            viewport: Viewport::new(view.center, view.zoom, width, height),
            plan: RenderPlan::default(),
            failures: ImageFailures::new(),
            popup: None,
            spider: None,
        }
    }

    /// Load lifecycle state.
    #[must_use]
    pub const fn status(&self) -> LoadStatus {
        self.status
    }

    /// Every loaded club.
    #[must_use]
    pub fn features(&self) -> &[ClubFeature] {
        &self.features
    }

    /// Clubs passing the current filter, in load order. This is the list
    /// panel's content.
    #[must_use]
    pub fn visible_features(&self) -> &[ClubFeature] {
        &self.visible
    }

    /// Active filter.
    #[must_use]
    pub const fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Display language.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Current viewport.
    #[must_use]
    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Nodes currently drawn.
    #[must_use]
    pub const fn plan(&self) -> &RenderPlan {
        &self.plan
    }

    /// Club whose popup is open.
    #[must_use]
    pub const fn popup(&self) -> Option<&StableId> {
        self.popup.as_ref()
    }

    /// Fanned-out cluster, if any.
    #[must_use]
    pub fn spider(&self) -> Option<&[SpiderLeg]> {
        self.spider.as_ref().map(|(_, legs)| legs.as_slice())
    }

    /// Non-empty cities, sorted, de-duplicated ignoring case. The first
    /// spelling seen wins.
    #[must_use]
    pub fn available_cities(&self) -> Vec<String> {
        let mut cities: BTreeMap<String, String> = BTreeMap::new();
        for feature in &self.features {
            let city = feature.properties.city.trim();
            if city.is_empty() {
                continue;
            }
            cities
                .entry(city.to_lowercase())
                .or_insert_with(|| city.to_string());
        }
        cities.into_values().collect()
    }

    /// Loads the clubs and moves the map to show them.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Superseded`] if a newer load on the same
    /// loader started meanwhile; its result is not applied here.
    pub async fn load(&mut self) -> Result<PlanDiff, LoadError> {
        self.status = LoadStatus::Loading;
        let loaded = self.loader.load().await?;
        Ok(self.apply_loaded(loaded))
    }

    /// Drops the cached clubs and reloads them from the network.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub async fn refresh(&mut self) -> Result<PlanDiff, LoadError> {
        self.status = LoadStatus::Loading;
        let loaded = self.loader.refresh().await?;
        Ok(self.apply_loaded(loaded))
    }

    fn apply_loaded(&mut self, loaded: Loaded) -> PlanDiff {
        let Loaded {
            collection,
            from_cache,
        } = loaded;

        self.status = LoadStatus::Loaded {
            count: collection.len(),
            from_cache,
        };
        self.features = collection.features;
        self.failures.clear();
        self.popup = None;
        self.visible = filter(&self.features, &self.filter, self.language);

        let view = initial_view(&self.features);
        self.viewport.center = view.center;
        self.viewport.zoom = view.zoom;
        self.rerender()
    }

    fn rerender(&mut self) -> PlanDiff {
        let next = self.engine.render(&self.visible, &self.viewport, &self.failures);
        let changes = diff(&self.plan, &next);
        if self
            .spider
            .as_ref()
            .is_some_and(|(key, _)| !next.nodes.contains_key(key))
        {
            self.spider = None;
        }
        self.plan = next;
        changes
    }

    fn refilter(&mut self) -> PlanDiff {
        self.visible = filter(&self.features, &self.filter, self.language);

        if self
            .popup
            .as_ref()
            .is_some_and(|id| !self.visible.iter().any(|f| &f.stable_id() == id))
        {
            self.popup = None;
        }

        if let Some(bounds) = GeoBounds::of_features(&self.visible) {
            let view = fit_bounds(&bounds, self.viewport.width, self.viewport.height, self.fit);
            self.viewport.center = view.center;
            self.viewport.zoom = view.zoom;
        }
        self.spider = None;
        self.rerender()
    }

    /// Applies `state` and fits the map to the clubs that pass it. With
    /// no matches the view stays where it is.
    pub fn set_filter(&mut self, state: FilterState) -> PlanDiff {
        if let Err(e) = self
            .loader
            .cache()
            .set(keys::LAST_FILTERS, &state, &CacheOptions::last_filters())
        {
            log::warn!("Failed to store filters: {e}");
        }
        self.filter = state;
        self.refilter()
    }

    /// Resets every filter.
    pub fn clear_filters(&mut self) -> PlanDiff {
        self.set_filter(FilterState::default())
    }

    /// Filters stored by the last [`Self::set_filter`], if still fresh.
    #[must_use]
    pub fn last_filters(&self) -> Option<FilterState> {
        self.loader
            .cache()
            .get(keys::LAST_FILTERS, &CacheOptions::last_filters())
    }

    /// Switches language. Day and text filters read localized fields, so
    /// the visible set is recomputed.
    pub fn set_language(&mut self, language: Language) -> PlanDiff {
        self.language = language;
        if let Err(e) = self.loader.cache().set(
            keys::USER_PREFERENCES,
            &UserPreferences { language },
            &CacheOptions::user_preferences(),
        ) {
            log::warn!("Failed to store preferences: {e}");
        }
        self.refilter()
    }

    /// Pans or zooms the map.
    pub fn set_view(&mut self, center: LatLng, zoom: u8) -> PlanDiff {
        self.viewport.center = center;
        self.viewport.zoom = zoom.min(self.engine.config().max_zoom);
        self.rerender()
    }

    /// Resizes the map element.
    pub fn resize(&mut self, width: f64, height: f64) -> PlanDiff {
        self.viewport.width = width;
        self.viewport.height = height;
        self.rerender()
    }

    /// Centers on the visible club `id` deep enough to show it as its own
    /// marker, and opens its popup.
    ///
    /// Returns `None` (and changes nothing) if `id` is not visible.
    pub fn select(&mut self, id: &StableId) -> Option<PlanDiff> {
        let feature = self.visible.iter().find(|f| &f.stable_id() == id)?;
        let view = self.engine.focus(feature, self.viewport.zoom);
        self.viewport.center = view.center;
        self.viewport.zoom = view.zoom;
        self.popup = Some(id.clone());
        Some(self.rerender())
    }

    /// Closes the popup.
    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// Handles a click on the drawn node `key`.
    ///
    /// Returns the action taken and the marker changes it caused, or
    /// `None` if `key` is not drawn.
    pub fn expand(&mut self, key: &NodeKey) -> Option<(ExpandAction, PlanDiff)> {
        let node = &self.plan.nodes.get(key)?.node;
        let action = self.engine.expand(node, &self.viewport);

        let changes = match &action {
            ExpandAction::OpenPopup(id) => {
                self.popup = Some(id.clone());
                PlanDiff::default()
            }
            ExpandAction::ZoomTo(view) => {
                self.viewport.center = view.center;
                self.viewport.zoom = view.zoom;
                self.rerender()
            }
            ExpandAction::Spiderfy(legs) => {
                self.spider = Some((key.clone(), legs.clone()));
                PlanDiff::default()
            }
        };

        Some((action, changes))
    }

    /// Records that `id`'s image failed to load; only its marker changes.
    pub fn image_failed(&mut self, id: StableId) -> PlanDiff {
        if !self.failures.mark_failed(id) {
            return PlanDiff::default();
        }
        self.rerender()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use runclub_map_cache::{Cache, ManualClock, MemoryStore};
    use runclub_map_club_models::{ClubProperties, FeatureCollection, Weekday};
    use runclub_map_spatial::cluster::ClusterNode;
    use runclub_map_spatial::icon::MarkerIcon;

    use super::*;
    use crate::loader::FeatureFetcher;

    struct Fixed(FeatureCollection);

    #[async_trait]
    impl FeatureFetcher for Fixed {
        async fn fetch(&self) -> Result<FeatureCollection, LoadError> {
            Ok(self.0.clone())
        }
    }

    fn club(name: &str, city: &str, frequency: &str, lat: f64, lng: f64) -> ClubFeature {
        ClubFeature::new(
            lng,
            lat,
            ClubProperties {
                name: name.to_string(),
                city: city.to_string(),
                frequency: frequency.to_string(),
                image: "crew.png".to_string(),
                ..ClubProperties::default()
            },
        )
        .unwrap()
    }

    fn clubs() -> Vec<ClubFeature> {
        vec![
            club("Canal Crew", "Paris", "Lundi 19h", 48.8720, 2.3650),
            club("Riverside Runners", "Lyon", "Monday 18:00", 45.7578, 4.8320),
            club("Confluence", "lyon", "Jeudi", 45.7430, 4.8180),
            club("Vieux Port", "Marseille", "Samedi", 43.2950, 5.3740),
        ]
    }

    fn loader_with(features: Vec<ClubFeature>) -> Arc<DataLoader> {
        let cache = Cache::with_clock(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
            "test",
        );
        Arc::new(DataLoader::new(
            Arc::new(Fixed(FeatureCollection::new(features))),
            cache,
            CacheOptions::default(),
        ))
    }

    async fn loaded_controller() -> ViewController {
        let mut controller = ViewController::new(
            loader_with(clubs()),
            ClusterEngine::default(),
            FitOptions::default(),
            1024.0,
            768.0,
        );
        controller.load().await.unwrap();
        controller
    }

    #[tokio::test]
    async fn starts_idle_at_default_view() {
        let controller = ViewController::new(
            loader_with(clubs()),
            ClusterEngine::default(),
            FitOptions::default(),
            800.0,
            600.0,
        );
        assert_eq!(controller.status(), LoadStatus::Idle);
        assert_eq!(controller.viewport().center, LatLng::new(46.5, 2.5));
        assert_eq!(controller.viewport().zoom, 6);
        assert!(controller.plan().is_empty());
    }

    #[tokio::test]
    async fn load_fits_initial_view_and_draws_markers() {
        let controller = loaded_controller().await;
        assert_eq!(
            controller.status(),
            LoadStatus::Loaded {
                count: 4,
                from_cache: false
            }
        );
        // Extent 5.6° of latitude.
        assert_eq!(controller.viewport().zoom, 5);
        assert!(!controller.plan().is_empty());

        let drawn: usize = controller.plan().nodes.values().map(|n| n.node.count()).sum();
        assert_eq!(drawn, 4);
    }

    #[tokio::test]
    async fn empty_source_renders_an_empty_map() {
        let mut controller = ViewController::new(
            loader_with(Vec::new()),
            ClusterEngine::default(),
            FitOptions::default(),
            800.0,
            600.0,
        );
        let changes = controller.load().await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(
            controller.status(),
            LoadStatus::Loaded {
                count: 0,
                from_cache: false
            }
        );
        assert_eq!(controller.viewport().zoom, 6);
        assert!(controller.available_cities().is_empty());
    }

    #[tokio::test]
    async fn filter_refits_to_matches() {
        let mut controller = loaded_controller().await;
        let before = controller.viewport().zoom;

        controller.set_filter(FilterState {
            city: "lyon".to_string(),
            ..FilterState::default()
        });

        assert_eq!(controller.visible_features().len(), 2);
        assert!(controller.viewport().zoom > before);
        assert!((controller.viewport().center.lat - 45.7504).abs() < 0.01);
    }

    #[tokio::test]
    async fn filter_without_matches_keeps_view() {
        let mut controller = loaded_controller().await;
        let view = *controller.viewport();

        controller.set_filter(FilterState {
            city: "Berlin".to_string(),
            ..FilterState::default()
        });

        assert!(controller.visible_features().is_empty());
        assert!(controller.plan().is_empty());
        assert_eq!(controller.viewport(), &view);
    }

    #[tokio::test]
    async fn clear_filters_restores_everything() {
        let mut controller = loaded_controller().await;
        controller.set_filter(FilterState {
            day: Some(Weekday::Monday),
            ..FilterState::default()
        });
        assert_eq!(controller.visible_features().len(), 2);

        controller.clear_filters();
        assert_eq!(controller.visible_features(), controller.features());
        assert_eq!(controller.last_filters(), Some(FilterState::default()));
    }

    #[tokio::test]
    async fn selection_uses_identity_not_position() {
        let mut controller = loaded_controller().await;
        controller.set_filter(FilterState {
            city: "lyon".to_string(),
            ..FilterState::default()
        });

        // Index 2 in the full set, index 1 in the filtered list.
        let target = controller.features()[2].stable_id();
        assert_eq!(controller.visible_features()[1].stable_id(), target);

        controller.select(&target).unwrap();
        assert_eq!(controller.popup(), Some(&target));
        assert!(controller.viewport().zoom >= 16);
        assert_eq!(
            controller.viewport().center,
            LatLng::new(45.7430, 4.8180)
        );

        let node = controller.plan().node_containing(&target).unwrap();
        assert!(matches!(node.node, ClusterNode::Leaf { .. }));
    }

    #[tokio::test]
    async fn selecting_a_hidden_club_does_nothing() {
        let mut controller = loaded_controller().await;
        controller.set_filter(FilterState {
            city: "lyon".to_string(),
            ..FilterState::default()
        });
        let paris = controller.features()[0].stable_id();
        assert!(controller.select(&paris).is_none());
        assert_eq!(controller.popup(), None);
    }

    #[tokio::test]
    async fn filtering_out_the_selected_club_closes_its_popup() {
        let mut controller = loaded_controller().await;
        let paris = controller.features()[0].stable_id();
        controller.select(&paris).unwrap();

        controller.set_filter(FilterState {
            city: "marseille".to_string(),
            ..FilterState::default()
        });
        assert_eq!(controller.popup(), None);
    }

    #[tokio::test]
    async fn expanding_a_cluster_zooms_in() {
        let mut controller = loaded_controller().await;
        controller.set_view(LatLng::new(45.75, 4.83), 8);

        let key = controller
            .plan()
            .nodes
            .keys()
            .find(|k| matches!(k, NodeKey::Cluster(ids) if ids.len() == 2))
            .cloned()
            .unwrap();

        let (action, changes) = controller.expand(&key).unwrap();
        assert!(matches!(action, ExpandAction::ZoomTo(_)));
        assert!(changes.removed.contains(&key));
        assert!(controller.viewport().zoom > 8);
    }

    #[tokio::test]
    async fn expanding_a_leaf_opens_its_popup() {
        let mut controller = loaded_controller().await;
        let marseille = controller.features()[3].stable_id();
        controller.select(&marseille).unwrap();
        controller.close_popup();

        let (action, changes) = controller.expand(&NodeKey::Leaf(marseille.clone(), 0)).unwrap();
        assert_eq!(action, ExpandAction::OpenPopup(marseille.clone()));
        assert!(changes.is_empty());
        assert_eq!(controller.popup(), Some(&marseille));
    }

    #[tokio::test]
    async fn image_failure_changes_only_that_marker() {
        let mut controller = loaded_controller().await;
        let lyon = controller.features()[1].stable_id();
        controller.select(&lyon).unwrap();

        let changes = controller.image_failed(lyon.clone());
        assert_eq!(changes.updated, vec![NodeKey::Leaf(lyon.clone(), 0)]);
        assert!(changes.added.is_empty() && changes.removed.is_empty());
        assert_eq!(
            controller.plan().node_containing(&lyon).unwrap().icon,
            MarkerIcon::Glyph
        );

        assert!(controller.image_failed(lyon).is_empty());
    }

    #[tokio::test]
    async fn available_cities_are_sorted_and_case_folded() {
        let controller = loaded_controller().await;
        assert_eq!(controller.available_cities(), ["Lyon", "Marseille", "Paris"]);
    }

    #[tokio::test]
    async fn language_preference_persists() {
        let loader = loader_with(clubs());
        let mut controller = ViewController::new(
            loader.clone(),
            ClusterEngine::default(),
            FitOptions::default(),
            800.0,
            600.0,
        );
        controller.set_language(Language::Secondary);

        let reopened = ViewController::new(
            loader,
            ClusterEngine::default(),
            FitOptions::default(),
            800.0,
            600.0,
        );
        assert_eq!(reopened.language(), Language::Secondary);
    }

    #[tokio::test]
    async fn second_load_comes_from_cache() {
        let mut controller = loaded_controller().await;
        controller.load().await.unwrap();
        assert_eq!(
            controller.status(),
            LoadStatus::Loaded {
                count: 4,
                from_cache: true
            }
        );

        controller.refresh().await.unwrap();
        assert_eq!(
            controller.status(),
            LoadStatus::Loaded {
                count: 4,
                from_cache: false
            }
        );
    }
}
