#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Map geometry for the run club map.
//!
//! Everything here is pure and synchronous: Web-Mercator projection,
//! initial and fit-to-viewport bounds, screen-space clustering over an
//! R-tree, spiderfying of co-located markers, marker icons, and the
//! diff between two render plans that drawing layers apply.

pub mod bounds;
pub mod cluster;
pub mod icon;
pub mod projection;
pub mod reconcile;
pub mod spiderfy;

pub use bounds::{FitOptions, GeoBounds, MapView, compute_bounds, fit_bounds, initial_view};
pub use cluster::{ClusterConfig, ClusterEngine, ClusterNode, ExpandAction, NodeKey, RenderPlan};
pub use projection::{LatLng, Viewport};
