//! Optional TOML file with engine tunables.
//!
//! ```toml
//! [cluster]
//! max_cluster_radius = 60.0
//!
//! [fit]
//! padding = 40.0
//!
//! [loader]
//! base_url = "https://runclubs.example"
//! ```

use std::path::Path;

use runclub_map_client::LoaderConfig;
use runclub_map_spatial::{ClusterConfig, FitOptions};
use serde::Deserialize;

/// Every tunable section. Missing sections and keys keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Clustering.
    pub cluster: ClusterConfig,
    /// Fit-to-viewport.
    pub fit: FitOptions,
    /// Client loading and caching.
    pub loader: LoaderConfig,
}

impl Settings {
    /// Reads `path`, or returns the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    /// for these settings.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        log::debug!("Reading settings from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [cluster]
            max_cluster_radius = 60.0

            [loader]
            base_url = "https://runclubs.example"

            [loader.cache]
            ttl_ms = 60000
            "#,
        )
        .unwrap();

        assert!((settings.cluster.max_cluster_radius - 60.0).abs() < f64::EPSILON);
        assert_eq!(settings.cluster.disable_clustering_at_zoom, 16);
        assert_eq!(settings.fit, FitOptions::default());
        assert_eq!(settings.loader.base_url, "https://runclubs.example");
        assert_eq!(settings.loader.cache.ttl_ms, 60_000);
        assert_eq!(settings.loader.cache.version, "1.0.0");
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }
}
