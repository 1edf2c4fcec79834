//! Incremental marker updates between two render plans.
//!
//! Drawing layers keep one marker per [`NodeKey`]. Applying a [`PlanDiff`]
//! removes stale markers, updates the ones whose icon or position moved,
//! and adds the new ones, so a marker that is still wanted is never torn
//! down and re-created.

use crate::cluster::{NodeKey, RenderPlan};

/// Changes that turn one plan into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanDiff {
    /// Keys present only in the new plan.
    pub added: Vec<NodeKey>,
    /// Keys present only in the old plan.
    pub removed: Vec<NodeKey>,
    /// Keys in both plans whose node or icon changed.
    pub updated: Vec<NodeKey>,
}

impl PlanDiff {
    /// Whether nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Diffs `previous` against `next`. Keys come out in key order.
#[must_use]
pub fn diff(previous: &RenderPlan, next: &RenderPlan) -> PlanDiff {
    let mut out = PlanDiff::default();

    for (key, node) in &next.nodes {
        match previous.nodes.get(key) {
            None => out.added.push(key.clone()),
            Some(old) if old != node => out.updated.push(key.clone()),
            Some(_) => {}
        }
    }

    out.removed = previous
        .nodes
        .keys()
        .filter(|key| !next.nodes.contains_key(*key))
        .cloned()
        .collect();

    out
}

#[cfg(test)]
mod tests {
    use runclub_map_club_models::{ClubFeature, ClubProperties};

    use super::*;
    use crate::cluster::ClusterEngine;
    use crate::icon::ImageFailures;
    use crate::projection::{LatLng, Viewport};

    fn club(name: &str, lat: f64, lng: f64) -> ClubFeature {
        ClubFeature::new(
            lng,
            lat,
            ClubProperties {
                name: name.to_string(),
                ..ClubProperties::default()
            },
        )
        .unwrap()
    }

    fn clubs() -> Vec<ClubFeature> {
        vec![
            club("Bellecour", 45.7578, 4.8320),
            club("Confluence", 45.7430, 4.8180),
            club("Part-Dieu", 45.7606, 4.8590),
        ]
    }

    #[test]
    fn same_plan_is_a_no_op() {
        let engine = ClusterEngine::default();
        let viewport = Viewport::new(LatLng::new(45.75, 4.84), 14, 1024.0, 768.0);
        let plan = engine.render(&clubs(), &viewport, &ImageFailures::new());
        assert!(diff(&plan, &plan).is_empty());
    }

    #[test]
    fn panning_keeps_surviving_markers() {
        let engine = ClusterEngine::default();
        let features = clubs();
        let failures = ImageFailures::new();
        let a = engine.render(
            &features,
            &Viewport::new(LatLng::new(45.75, 4.84), 14, 1024.0, 768.0),
            &failures,
        );
        let b = engine.render(
            &features,
            &Viewport::new(LatLng::new(45.751, 4.841), 14, 1024.0, 768.0),
            &failures,
        );
        let changes = diff(&a, &b);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn zooming_in_replaces_cluster_with_leaves() {
        let engine = ClusterEngine::default();
        let features = clubs();
        let failures = ImageFailures::new();
        let far = engine.render(
            &features,
            &Viewport::new(LatLng::new(45.75, 4.84), 8, 1024.0, 768.0),
            &failures,
        );
        let near = engine.render(
            &features,
            &Viewport::new(LatLng::new(45.75, 4.84), 14, 1024.0, 768.0),
            &failures,
        );
        let changes = diff(&far, &near);
        assert_eq!(changes.removed.len(), 1);
        assert!(matches!(changes.removed[0], NodeKey::Cluster(_)));
        assert_eq!(changes.added.len(), 3);
    }

    #[test]
    fn image_failure_updates_only_that_marker() {
        let engine = ClusterEngine::default();
        let mut features = clubs();
        for f in &mut features {
            f.properties.image = "crew.png".to_string();
        }
        let viewport = Viewport::new(LatLng::new(45.75, 4.84), 14, 1024.0, 768.0);
        let before = engine.render(&features, &viewport, &ImageFailures::new());

        let mut failures = ImageFailures::new();
        failures.mark_failed(features[1].stable_id());
        let after = engine.render(&features, &viewport, &failures);

        let changes = diff(&before, &after);
        assert_eq!(changes.updated, vec![NodeKey::Leaf(features[1].stable_id(), 0)]);
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
    }
}
