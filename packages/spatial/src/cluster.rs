//! Screen-space marker clustering.
//!
//! Features are projected to world pixels at the current zoom and grouped
//! greedily: in input order, each feature not yet assigned seeds a node
//! and pulls in every unassigned feature within
//! [`ClusterConfig::max_cluster_radius`] pixels of it. Neighbour lookups
//! go through an R-tree, so a pass costs `O(n log n)` in the number of
//! features and does not depend on the screen size.
//!
//! At or beyond [`ClusterConfig::disable_clustering_at_zoom`] every feature
//! is its own leaf.
//!
//! Every renderable feature ends up in exactly one node. Features at
//! `(0, 0)` or with non-finite coordinates never enter clustering.

use std::collections::BTreeMap;

use rstar::RTree;
use rstar::primitives::GeomWithData;
use runclub_map_club_models::{ClubFeature, StableId};
use serde::{Deserialize, Serialize};

use crate::bounds::{FitOptions, GeoBounds, MapView, fit_bounds};
use crate::icon::{ImageFailures, ImagePaths, MarkerIcon};
use crate::projection::{LatLng, Pixel, Viewport, project};
use crate::spiderfy::{SpiderLeg, spiderfy};

/// Clustering and presentation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Features closer than this many screen pixels merge.
    pub max_cluster_radius: f64,
    /// From this zoom on, every feature renders individually.
    pub disable_clustering_at_zoom: u8,
    /// Deepest zoom the tile layer supports.
    pub max_zoom: u8,
    /// Spiderfy leg length in pixels.
    pub spiderfy_leg_length: f64,
    /// Members closer than this many pixels at `max_zoom` count as one
    /// location.
    pub same_location_tolerance: f64,
    /// Extra pixels around the viewport in which nodes are still kept.
    pub viewport_padding: f64,
    /// Where club images live.
    pub images: ImagePaths,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_cluster_radius: 80.0,
            disable_clustering_at_zoom: 16,
            max_zoom: 19,
            spiderfy_leg_length: 40.0,
            same_location_tolerance: 2.0,
            viewport_padding: 80.0,
            images: ImagePaths::default(),
        }
    }
}

/// Whether a position may be put on the map.
///
/// `(0, 0)` is what a half-initialized or defaulted marker looks like, so
/// it is refused along with non-finite values.
#[must_use]
pub fn is_renderable(position: LatLng) -> bool {
    #[allow(clippy::float_cmp)]
    let at_origin = position.lat == 0.0 && position.lng == 0.0;
    position.is_finite() && !at_origin
}

/// Identity of a visual node, stable across recomputations as long as
/// its membership does not change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    /// A single club, with the number of earlier leaves in the same plan
    /// that share its identity (duplicated sheet rows).
    Leaf(StableId, usize),
    /// An aggregate, keyed by its sorted member identities.
    Cluster(Vec<StableId>),
}

/// One member of an aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMember {
    /// Club identity.
    pub id: StableId,
    /// Club position.
    pub position: LatLng,
}

/// A visual node: one club or an aggregate of nearby clubs.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterNode {
    /// A single club marker.
    Leaf {
        /// Club identity.
        id: StableId,
        /// Club position.
        position: LatLng,
        /// Raw image cell, resolved at render time.
        image: String,
    },
    /// An aggregate bubble.
    Cluster {
        /// Mean position of the members.
        centroid: LatLng,
        /// Members, in input order.
        members: Vec<ClusterMember>,
    },
}

impl ClusterNode {
    /// Position the node is drawn at.
    #[must_use]
    pub const fn position(&self) -> LatLng {
        match self {
            Self::Leaf { position, .. } => *position,
            Self::Cluster { centroid, .. } => *centroid,
        }
    }

    /// Number of clubs represented.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Cluster { members, .. } => members.len(),
        }
    }

    /// Identities of the clubs represented.
    #[must_use]
    pub fn member_ids(&self) -> Vec<&StableId> {
        match self {
            Self::Leaf { id, .. } => vec![id],
            Self::Cluster { members, .. } => members.iter().map(|m| &m.id).collect(),
        }
    }

    /// Stable key for reconciliation. Leaves get occurrence `0`;
    /// [`ClusterEngine::render`] numbers repeated leaves.
    #[must_use]
    pub fn key(&self) -> NodeKey {
        match self {
            Self::Leaf { id, .. } => NodeKey::Leaf(id.clone(), 0),
            Self::Cluster { members, .. } => {
                let mut ids: Vec<StableId> = members.iter().map(|m| m.id.clone()).collect();
                ids.sort();
                NodeKey::Cluster(ids)
            }
        }
    }

    /// Bounding box of the members.
    #[must_use]
    pub fn bounds(&self) -> Option<GeoBounds> {
        match self {
            Self::Leaf { position, .. } => GeoBounds::from_positions([*position]),
            Self::Cluster { members, .. } => {
                GeoBounds::from_positions(members.iter().map(|m| m.position))
            }
        }
    }
}

/// A node ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNode {
    /// The node.
    pub node: ClusterNode,
    /// Its icon.
    pub icon: MarkerIcon,
}

/// The desired visual state for one `(features, viewport)` pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPlan {
    /// Nodes inside the padded viewport, by key.
    pub nodes: BTreeMap<NodeKey, RenderedNode>,
}

impl RenderPlan {
    /// Node containing club `id`, if it is drawn.
    #[must_use]
    pub fn node_containing(&self, id: &StableId) -> Option<&RenderedNode> {
        self.nodes
            .values()
            .find(|n| n.node.member_ids().contains(&id))
    }

    /// Number of drawn nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// What expanding a node does.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandAction {
    /// A single club: open its popup.
    OpenPopup(StableId),
    /// Zoom in to the members' bounds.
    ZoomTo(MapView),
    /// Members share a location (or the map is fully zoomed in): fan them
    /// out around the centroid.
    Spiderfy(Vec<SpiderLeg>),
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Groups features into nodes and turns nodes into render plans.
#[derive(Debug, Clone, Default)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    /// Creates an engine with `config`.
    #[must_use]
    pub const fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Groups `features` into nodes at `zoom`.
    ///
    /// The result covers every renderable feature exactly once. Nodes come
    /// out in the input order of their first member.
    #[must_use]
    pub fn cluster(&self, features: &[ClubFeature], zoom: u8) -> Vec<ClusterNode> {
        let renderable: Vec<&ClubFeature> = features
            .iter()
            .filter(|f| {
                let ok = is_renderable(LatLng::new(f.latitude(), f.longitude()));
                if !ok {
                    log::warn!(
                        "Not rendering {:?}: unusable position {:?}",
                        f.properties.name,
                        f.coordinates()
                    );
                }
                ok
            })
            .collect();

        if zoom >= self.config.disable_clustering_at_zoom {
            return renderable.into_iter().map(leaf).collect();
        }

        let z = f64::from(zoom);
        let pixels: Vec<Pixel> = renderable
            .iter()
            .map(|f| project(LatLng::new(f.latitude(), f.longitude()), z))
            .collect();

        let tree: RTree<IndexedPoint> = RTree::bulk_load(
            pixels
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new(p.to_array(), i))
                .collect(),
        );

        let radius_sq = self.config.max_cluster_radius * self.config.max_cluster_radius;
        let mut assigned = vec![false; renderable.len()];
        let mut nodes = Vec::new();

        for (seed, pixel) in pixels.iter().enumerate() {
            if assigned[seed] {
                continue;
            }

            let mut members: Vec<usize> = tree
                .locate_within_distance(pixel.to_array(), radius_sq)
                .map(|p| p.data)
                .filter(|&i| !assigned[i])
                .collect();
            members.sort_unstable();

            for &i in &members {
                assigned[i] = true;
            }

            if members.len() == 1 {
                nodes.push(leaf(renderable[seed]));
            } else {
                nodes.push(aggregate(members.iter().map(|&i| renderable[i])));
            }
        }

        nodes
    }

    /// Computes the plan for `features` seen through `viewport`.
    #[must_use]
    pub fn render(
        &self,
        features: &[ClubFeature],
        viewport: &Viewport,
        failures: &ImageFailures,
    ) -> RenderPlan {
        let mut occurrences: BTreeMap<StableId, usize> = BTreeMap::new();
        let nodes = self
            .cluster(features, viewport.zoom)
            .into_iter()
            .filter(|node| viewport.contains(node.position(), self.config.viewport_padding))
            .map(|node| {
                let icon = match &node {
                    ClusterNode::Leaf { id, image, .. } => {
                        self.config.images.icon_for(image, failures.has_failed(id))
                    }
                    ClusterNode::Cluster { members, .. } => MarkerIcon::Cluster {
                        count: members.len(),
                    },
                };
                let key = match &node {
                    ClusterNode::Leaf { id, .. } => {
                        let seen = occurrences.entry(id.clone()).or_insert(0);
                        let key = NodeKey::Leaf(id.clone(), *seen);
                        *seen += 1;
                        key
                    }
                    ClusterNode::Cluster { .. } => node.key(),
                };
                (key, RenderedNode { node, icon })
            })
            .collect();

        RenderPlan { nodes }
    }

    /// Whether every member of `node` sits on (almost) the same spot, i.e.
    /// zooming in would never separate them.
    #[must_use]
    pub fn is_co_located(&self, node: &ClusterNode) -> bool {
        let ClusterNode::Cluster { members, .. } = node else {
            return true;
        };
        let z = f64::from(self.config.max_zoom);
        let Some(first) = members.first() else {
            return true;
        };
        let anchor = project(first.position, z);
        members
            .iter()
            .all(|m| project(m.position, z).distance(anchor) <= self.config.same_location_tolerance)
    }

    /// Decides what a click on `node` does in `viewport`.
    #[must_use]
    pub fn expand(&self, node: &ClusterNode, viewport: &Viewport) -> ExpandAction {
        match node {
            ClusterNode::Leaf { id, .. } => ExpandAction::OpenPopup(id.clone()),
            ClusterNode::Cluster { centroid, members } => {
                if viewport.zoom >= self.config.max_zoom || self.is_co_located(node) {
                    return ExpandAction::Spiderfy(spiderfy(
                        *centroid,
                        members,
                        viewport.zoom,
                        self.config.spiderfy_leg_length,
                    ));
                }

                let Some(bounds) = node.bounds() else {
                    return ExpandAction::ZoomTo(MapView {
                        center: *centroid,
                        zoom: viewport.zoom.saturating_add(1).min(self.config.max_zoom),
                    });
                };
                let mut view = fit_bounds(
                    &bounds,
                    viewport.width,
                    viewport.height,
                    FitOptions {
                        padding: 20.0,
                        max_zoom: self.config.max_zoom,
                    },
                );
                // Always make progress, even if the members already fit.
                view.zoom = view
                    .zoom
                    .max(viewport.zoom.saturating_add(1))
                    .min(self.config.max_zoom);
                ExpandAction::ZoomTo(view)
            }
        }
    }

    /// View that shows `feature` as an individual marker, never folded
    /// into a cluster.
    #[must_use]
    pub fn focus(&self, feature: &ClubFeature, current_zoom: u8) -> MapView {
        MapView {
            center: LatLng::new(feature.latitude(), feature.longitude()),
            zoom: current_zoom.max(self.config.disable_clustering_at_zoom),
        }
    }
}

fn leaf(feature: &ClubFeature) -> ClusterNode {
    ClusterNode::Leaf {
        id: feature.stable_id(),
        position: LatLng::new(feature.latitude(), feature.longitude()),
        image: feature.properties.image.clone(),
    }
}

fn aggregate<'a>(features: impl Iterator<Item = &'a ClubFeature>) -> ClusterNode {
    let members: Vec<ClusterMember> = features
        .map(|f| ClusterMember {
            id: f.stable_id(),
            position: LatLng::new(f.latitude(), f.longitude()),
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let n = members.len() as f64;
    let (lat_sum, lng_sum) = members
        .iter()
        .fold((0.0, 0.0), |(lat, lng), m| (lat + m.position.lat, lng + m.position.lng));

    ClusterNode::Cluster {
        centroid: LatLng::new(lat_sum / n, lng_sum / n),
        members,
    }
}
