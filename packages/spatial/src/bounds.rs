//! Map center and zoom for a set of features.
//!
//! [`compute_bounds`] is the coarse initial-load heuristic: a planar
//! bounding box and a fixed threshold table on its larger side.
//! [`fit_bounds`] is the precise fit-to-viewport used when the visible
//! subset changes.
//!
//! Neither handles extents that cross the antimeridian: a set spanning
//! 179°E and 179°W is treated as 358° wide.

use geo::{BoundingRect, MultiPoint, Point, Rect};
use runclub_map_club_models::ClubFeature;
use serde::{Deserialize, Serialize};

use crate::projection::{LatLng, Pixel, project, unproject};

/// Center used before any club is loaded (mainland France).
pub const DEFAULT_CENTER: LatLng = LatLng::new(46.5, 2.5);

/// Zoom used before any club is loaded.
pub const DEFAULT_ZOOM: u8 = 6;

/// Zoom used when exactly one club is shown.
pub const SINGLE_FEATURE_ZOOM: u8 = 10;

/// A map center and zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// Map center.
    pub center: LatLng,
    /// Zoom level.
    pub zoom: u8,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
        }
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Minimum latitude.
    pub south: f64,
    /// Minimum longitude.
    pub west: f64,
    /// Maximum latitude.
    pub north: f64,
    /// Maximum longitude.
    pub east: f64,
}

impl GeoBounds {
    /// Planar bounding box of `positions`, `None` if empty.
    #[must_use]
    pub fn from_positions(positions: impl IntoIterator<Item = LatLng>) -> Option<Self> {
        let points: MultiPoint<f64> = positions
            .into_iter()
            .map(|p| Point::new(p.lng, p.lat))
            .collect();
        points.bounding_rect().map(Self::from)
    }

    /// Bounding box of `features`, `None` if empty.
    #[must_use]
    pub fn of_features(features: &[ClubFeature]) -> Option<Self> {
        Self::from_positions(
            features
                .iter()
                .map(|f| LatLng::new(f.latitude(), f.longitude())),
        )
    }

    /// Midpoint of the box.
    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(
            f64::midpoint(self.south, self.north),
            f64::midpoint(self.west, self.east),
        )
    }

    /// Larger of the latitude and longitude extents, in degrees.
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        (self.north - self.south).max(self.east - self.west)
    }
}

impl From<Rect<f64>> for GeoBounds {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            south: rect.min().y,
            west: rect.min().x,
            north: rect.max().y,
            east: rect.max().x,
        }
    }
}

/// Zoom level for a bounding box whose larger side spans `max_diff`
/// degrees.
#[must_use]
pub fn zoom_for_extent(max_diff: f64) -> u8 {
    if max_diff < 0.1 {
        12
    } else if max_diff < 0.5 {
        10
    } else if max_diff < 1.0 {
        8
    } else if max_diff < 2.0 {
        7
    } else if max_diff < 5.0 {
        6
    } else {
        5
    }
}

/// Initial center and zoom for `features`.
///
/// Returns `None` for an empty slice; the caller keeps its default view
/// ([`MapView::default`]).
#[must_use]
pub fn compute_bounds(features: &[ClubFeature]) -> Option<MapView> {
    match features {
        [] => None,
        [only] => Some(MapView {
            center: LatLng::new(only.latitude(), only.longitude()),
            zoom: SINGLE_FEATURE_ZOOM,
        }),
        _ => {
            let bounds = GeoBounds::of_features(features)?;
            Some(MapView {
                center: bounds.center(),
                zoom: zoom_for_extent(bounds.max_extent()),
            })
        }
    }
}

/// [`compute_bounds`], falling back to the default view.
#[must_use]
pub fn initial_view(features: &[ClubFeature]) -> MapView {
    compute_bounds(features).unwrap_or_default()
}

/// Options for [`fit_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Pixels kept free on every side of the box.
    pub padding: f64,
    /// Upper zoom bound, so a single point is not shown at street level.
    pub max_zoom: u8,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            padding: 50.0,
            max_zoom: 14,
        }
    }
}

/// Largest integer zoom at which `bounds` fits a `width` × `height` map,
/// centered on the box.
#[must_use]
pub fn fit_bounds(bounds: &GeoBounds, width: f64, height: f64, options: FitOptions) -> MapView {
    let nw = project(LatLng::new(bounds.north, bounds.west), 0.0);
    let se = project(LatLng::new(bounds.south, bounds.east), 0.0);
    let center = unproject(
        Pixel::new(f64::midpoint(nw.x, se.x), f64::midpoint(nw.y, se.y)),
        0.0,
    );

    let avail_w = (width - 2.0 * options.padding).max(1.0);
    let avail_h = (height - 2.0 * options.padding).max(1.0);
    let extent_w = se.x - nw.x;
    let extent_h = se.y - nw.y;

    let scale = match (extent_w > 0.0, extent_h > 0.0) {
        (false, false) => f64::INFINITY,
        (true, false) => avail_w / extent_w,
        (false, true) => avail_h / extent_h,
        (true, true) => (avail_w / extent_w).min(avail_h / extent_h),
    };

    let zoom = if scale.is_finite() {
        clamp_zoom(scale.log2().floor(), options.max_zoom)
    } else {
        options.max_zoom
    };

    MapView { center, zoom }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_zoom(zoom: f64, max_zoom: u8) -> u8 {
    zoom.clamp(0.0, f64::from(max_zoom)) as u8
}
