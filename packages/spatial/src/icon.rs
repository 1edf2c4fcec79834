//! Marker icons.
//!
//! A club marker shows the club image as a round avatar. Sheet editors
//! write that image in several shapes (bare file name, a path under the
//! old `public/` folder, a URL pointing at a dev server), so every value
//! goes through [`ImagePaths::resolve`] first. A marker whose image fails
//! to load falls back to [`MarkerIcon::Glyph`] on its own; other markers
//! are unaffected.

use std::collections::BTreeSet;

use runclub_map_club_models::StableId;
use serde::{Deserialize, Serialize};

/// Default site path holding club images.
pub const DEFAULT_IMAGE_BASE: &str = "/images";

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "[::1]"];

/// What a marker displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerIcon {
    /// Round avatar loaded from `url`.
    Avatar {
        /// Resolved image URL.
        url: String,
    },
    /// Generic runner glyph (no image, or the image failed to load).
    Glyph,
    /// Aggregate bubble showing a member count.
    Cluster {
        /// Number of clubs in the cluster.
        count: usize,
    },
}

/// Corrects image references to the site's image base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePaths {
    /// Site path (or absolute URL prefix) images are served from.
    pub base: String,
}

impl Default for ImagePaths {
    fn default() -> Self {
        Self {
            base: DEFAULT_IMAGE_BASE.to_string(),
        }
    }
}

impl ImagePaths {
    /// Creates a resolver rooted at `base`.
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Base path without trailing slashes, however it was configured.
    fn root(&self) -> &str {
        self.base.trim_end_matches('/')
    }

    fn local(&self, file_name: &str) -> Option<String> {
        let file_name = file_name.trim_matches('/');
        if file_name.is_empty() {
            return None;
        }
        Some(format!("{}/{file_name}", self.root()))
    }

    /// Normalizes a raw image cell. Returns `None` when there is nothing
    /// to load.
    ///
    /// * bare file names and relative or mis-rooted paths are re-rooted
    ///   under the base path, keeping only the file name;
    /// * paths already under the base path are kept;
    /// * `http(s)` URLs to a local dev host are re-rooted the same way;
    /// * other `http(s)`, protocol-relative and `data:` URLs are kept.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if raw.starts_with("data:") || raw.starts_with("//") {
            return Some(raw.to_string());
        }

        if let Some(rest) = raw
            .strip_prefix("https://")
            .or_else(|| raw.strip_prefix("http://"))
        {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            let host = host.rsplit_once(':').map_or(host, |(h, port)| {
                if port.chars().all(|c| c.is_ascii_digit()) { h } else { host }
            });
            if LOCAL_HOSTS.contains(&host) {
                return self.local(file_name(path));
            }
            return Some(raw.to_string());
        }

        let root = self.root();
        if !root.is_empty() && raw.starts_with(&format!("{root}/")) {
            return Some(raw.to_string());
        }

        self.local(file_name(raw))
    }

    /// Icon for a club given its raw image cell and whether that image
    /// already failed to load.
    #[must_use]
    pub fn icon_for(&self, raw_image: &str, failed: bool) -> MarkerIcon {
        if failed {
            return MarkerIcon::Glyph;
        }
        self.resolve(raw_image)
            .map_or(MarkerIcon::Glyph, |url| MarkerIcon::Avatar { url })
    }
}

fn file_name(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Images that failed to load, per club.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFailures(BTreeSet<StableId>);

impl ImageFailures {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Records that `id`'s image failed. Returns `true` if this is new.
    pub fn mark_failed(&mut self, id: StableId) -> bool {
        self.0.insert(id)
    }

    /// Whether `id`'s image failed.
    #[must_use]
    pub fn has_failed(&self, id: &StableId) -> bool {
        self.0.contains(id)
    }

    /// Forgets every failure (e.g. after a data refresh).
    pub fn clear(&mut self) {
        self.0.clear();
    }
}
