//! Spherical Web-Mercator projection (EPSG:3857) in screen pixels, the same
//! space slippy-map tile layers use: the world is `256 * 2^zoom` pixels
//! wide, origin at the north-west corner.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Tile edge length in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the square Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl LatLng {
    /// Creates a position.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both values are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A position in world pixels at some zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    /// Horizontal, increasing eastward.
    pub x: f64,
    /// Vertical, increasing southward.
    pub y: f64,
}

impl Pixel {
    /// Creates a pixel position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// As an `[x, y]` array, for spatial indexing.
    #[must_use]
    pub const fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// World width in pixels at `zoom`.
#[must_use]
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

/// Projects `position` to world pixels at `zoom`.
#[must_use]
pub fn project(position: LatLng, zoom: f64) -> Pixel {
    let size = world_size(zoom);
    let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let sin = lat.sin();
    let x = (position.lng + 180.0) / 360.0 * size;
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * size;
    Pixel::new(x, y)
}

/// Inverse of [`project`].
#[must_use]
pub fn unproject(pixel: Pixel, zoom: f64) -> LatLng {
    let size = world_size(zoom);
    let lng = pixel.x / size * 360.0 - 180.0;
    let n = PI - 2.0 * PI * pixel.y / size;
    let lat = n.sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

/// The live map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Map center.
    pub center: LatLng,
    /// Integer zoom level.
    pub zoom: u8,
    /// Width of the map element in pixels.
    pub width: f64,
    /// Height of the map element in pixels.
    pub height: f64,
}

impl Viewport {
    /// Creates a viewport.
    #[must_use]
    pub const fn new(center: LatLng, zoom: u8, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
        }
    }

    /// Pixel bounds `(top_left, bottom_right)` at the viewport's zoom,
    /// grown by `padding` on every side.
    #[must_use]
    pub fn pixel_bounds(&self, padding: f64) -> (Pixel, Pixel) {
        let c = project(self.center, f64::from(self.zoom));
        let half_w = self.width / 2.0 + padding;
        let half_h = self.height / 2.0 + padding;
        (
            Pixel::new(c.x - half_w, c.y - half_h),
            Pixel::new(c.x + half_w, c.y + half_h),
        )
    }

    /// Whether `position` falls inside the padded viewport.
    #[must_use]
    pub fn contains(&self, position: LatLng, padding: f64) -> bool {
        let (min, max) = self.pixel_bounds(padding);
        let p = project(position, f64::from(self.zoom));
        (min.x..=max.x).contains(&p.x) && (min.y..=max.y).contains(&p.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_origin_to_world_center() {
        let p = project(LatLng::new(0.0, 0.0), 0.0);
        assert!((p.x - 128.0).abs() < 1e-9);
        assert!((p.y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn project_unproject_roundtrip() {
        let original = LatLng::new(45.75, 4.85);
        for zoom in [0.0, 6.0, 16.0] {
            let back = unproject(project(original, zoom), zoom);
            assert!((back.lat - original.lat).abs() < 1e-9, "zoom {zoom}");
            assert!((back.lng - original.lng).abs() < 1e-9, "zoom {zoom}");
        }
    }

    #[test]
    fn each_zoom_doubles_pixel_distances() {
        let a = LatLng::new(48.85, 2.35);
        let b = LatLng::new(48.86, 2.36);
        let d10 = project(a, 10.0).distance(project(b, 10.0));
        let d11 = project(a, 11.0).distance(project(b, 11.0));
        assert!((d11 / d10 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn viewport_contains_center_but_not_far_points() {
        let viewport = Viewport::new(LatLng::new(45.75, 4.85), 12, 800.0, 600.0);
        assert!(viewport.contains(LatLng::new(45.75, 4.85), 0.0));
        assert!(!viewport.contains(LatLng::new(48.85, 2.35), 0.0));
    }
}
