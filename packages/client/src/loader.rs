//! Cache-first loading of the published club collection.
//!
//! A live cache entry is served without touching the network. Otherwise
//! the collection is fetched and, when it holds at least one club,
//! written back to the cache.
//!
//! Every load takes a generation ticket. A fetch that resolves after a
//! newer load has started is discarded with [`LoadError::Superseded`],
//! so a slow response never overwrites fresher state.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use runclub_map_cache::{Cache, CacheOptions, CachedEntry, keys};
use runclub_map_club_models::{ClubFeature, ClubProperties, FeatureCollection};
use serde::{Deserialize, Serialize};

/// Errors from loading the collection.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The request could not be sent or its body read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Unexpected HTTP status {status}")]
    Status {
        /// Response status code.
        status: u16,
    },

    /// The body is not a feature collection.
    #[error("Invalid feature collection: {0}")]
    Parse(String),

    /// A newer load started while this one was in flight.
    #[error("Load superseded by a newer request")]
    Superseded,
}

/// Where and how to load from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Site origin serving `/api/runclubs`.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Lifetime and version of the cached collection.
    pub cache: CacheOptions,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
            cache: CacheOptions::club_data(),
        }
    }
}

/// Produces the club collection from somewhere remote.
#[async_trait]
pub trait FeatureFetcher: Send + Sync {
    /// Fetches the current collection.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the collection cannot be obtained.
    async fn fetch(&self) -> Result<FeatureCollection, LoadError>;
}

/// Parses a collection body leniently: every feature is validated on its
/// own and the ones without a point geometry, usable coordinates or a
/// name are dropped.
///
/// # Errors
///
/// Returns [`LoadError::Parse`] if the body is not a `GeoJSON`
/// `FeatureCollection`.
pub fn parse_collection(body: &str) -> Result<FeatureCollection, LoadError> {
    let geojson = geojson::GeoJson::from_str(body).map_err(|e| LoadError::Parse(e.to_string()))?;
    let geojson::GeoJson::FeatureCollection(collection) = geojson else {
        return Err(LoadError::Parse(
            "expected a FeatureCollection".to_string(),
        ));
    };

    let total = collection.features.len();
    let features: Vec<ClubFeature> = collection
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(i, feature)| match to_club(feature) {
            Ok(club) => Some(club),
            Err(reason) => {
                log::warn!("Dropping feature {i}: {reason}");
                None
            }
        })
        .collect();

    if features.len() < total {
        log::warn!("Kept {} of {total} features", features.len());
    }

    Ok(FeatureCollection::new(features))
}

fn to_club(feature: geojson::Feature) -> Result<ClubFeature, String> {
    let geometry = feature.geometry.ok_or("no geometry")?;
    let geojson::Value::Point(position) = geometry.value else {
        return Err("geometry is not a Point".to_string());
    };
    let [longitude, latitude, ..] = position.as_slice() else {
        return Err(format!("point has {} coordinates", position.len()));
    };

    let properties = serde_json::Value::Object(feature.properties.unwrap_or_default());
    let properties: ClubProperties =
        serde_json::from_value(properties).map_err(|e| format!("bad properties: {e}"))?;

    ClubFeature::new(*longitude, *latitude, properties).map_err(|e| e.to_string())
}

/// Fetches `/api/runclubs` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Creates a fetcher for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &LoaderConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/runclubs", config.base_url.trim_end_matches('/')),
        })
    }

    /// The endpoint this fetcher calls.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeatureFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<FeatureCollection, LoadError> {
        log::debug!("GET {}", self.url);
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_collection(&body)
    }
}

/// A finished load.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    /// The clubs.
    pub collection: FeatureCollection,
    /// Whether they came from the cache.
    pub from_cache: bool,
}

/// What the cache holds for the club collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// A live club entry exists.
    pub from_cache: bool,
    /// Age of that entry.
    pub age_ms: Option<i64>,
    /// When it was written, epoch milliseconds.
    pub last_update: Option<i64>,
    /// Entries owned by the cache.
    pub total_items: usize,
    /// Their serialized size.
    pub total_bytes: usize,
}

/// Cache-first loader.
pub struct DataLoader {
    fetcher: Arc<dyn FeatureFetcher>,
    cache: Cache,
    options: CacheOptions,
    generation: AtomicU64,
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("cache", &self.cache)
            .field("options", &self.options)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl DataLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(fetcher: Arc<dyn FeatureFetcher>, cache: Cache, options: CacheOptions) -> Self {
        Self {
            fetcher,
            cache,
            options,
            generation: AtomicU64::new(0),
        }
    }

    /// The cache this loader reads and writes.
    #[must_use]
    pub const fn cache(&self) -> &Cache {
        &self.cache
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Loads the collection.
    ///
    /// Network and parse failures are logged and degrade to an empty
    /// collection, which is never cached.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Superseded`] if a newer load started before
    /// this one finished.
    pub async fn load(&self) -> Result<Loaded, LoadError> {
        let ticket = self.begin();

        if let Some(collection) = self
            .cache
            .get::<FeatureCollection>(keys::RUNCLUBS_DATA, &self.options)
        {
            log::info!("Loaded {} clubs from cache", collection.len());
            return Ok(Loaded {
                collection,
                from_cache: true,
            });
        }

        let result = self.fetcher.fetch().await;

        if !self.is_current(ticket) {
            log::debug!("Discarding load {ticket}: superseded");
            return Err(LoadError::Superseded);
        }

        let collection = match result {
            Ok(collection) => collection,
            Err(e) => {
                log::error!("Failed to load clubs: {e}");
                return Ok(Loaded {
                    collection: FeatureCollection::empty(),
                    from_cache: false,
                });
            }
        };

        log::info!("Loaded {} clubs from network", collection.len());
        if !collection.is_empty() {
            if let Err(e) = self
                .cache
                .set(keys::RUNCLUBS_DATA, &collection, &self.options)
            {
                log::warn!("Failed to cache clubs: {e}");
            }
        }

        Ok(Loaded {
            collection,
            from_cache: false,
        })
    }

    /// Drops the cached collection and loads from the network.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Superseded`] like [`Self::load`].
    pub async fn refresh(&self) -> Result<Loaded, LoadError> {
        if let Err(e) = self.cache.remove(keys::RUNCLUBS_DATA) {
            log::warn!("Failed to drop cached clubs: {e}");
        }
        self.load().await
    }

    /// Summary of the cached collection.
    #[must_use]
    pub fn cache_status(&self) -> CacheStatus {
        let stats = self.cache.stats();
        let entry = self
            .cache
            .get_entry::<serde::de::IgnoredAny>(keys::RUNCLUBS_DATA, &self.options);
        let now = self.cache.now_millis();

        CacheStatus {
            from_cache: entry.is_some(),
            age_ms: entry.as_ref().map(|e: &CachedEntry<_>| now - e.timestamp),
            last_update: entry.as_ref().map(|e| e.timestamp),
            total_items: stats.total_items,
            total_bytes: stats.total_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use runclub_map_cache::{ManualClock, MemoryStore};
    use tokio::sync::Notify;

    use super::*;

    const BODY: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [4.85, 45.75] },
                "properties": { "name": "Riverside Runners", "city": "Lyon" }
            },
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [2.35, 48.85] },
                "properties": { "name": "Canal Crew", "city": "Paris", "social": { "instagram": "" } }
            }
        ]
    }"#;

    fn collection(names: &[&str]) -> FeatureCollection {
        FeatureCollection::new(
            names
                .iter()
                .map(|name| {
                    ClubFeature::new(
                        4.85,
                        45.75,
                        ClubProperties {
                            name: (*name).to_string(),
                            ..ClubProperties::default()
                        },
                    )
                    .unwrap()
                })
                .collect(),
        )
    }

    struct StubFetcher {
        response: Result<FeatureCollection, u16>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn ok(collection: FeatureCollection) -> Self {
            Self {
                response: Ok(collection),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                response: Err(status),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeatureFetcher for StubFetcher {
        async fn fetch(&self) -> Result<FeatureCollection, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .map_err(|status| LoadError::Status { status })
        }
    }

    fn cache(clock: Arc<ManualClock>) -> Cache {
        Cache::with_clock(Arc::new(MemoryStore::new()), clock, "test")
    }

    #[test]
    fn parses_collection_and_drops_invalid_features() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [4.85, 45.75] },
                  "properties": { "name": "Good" } },
                { "type": "Feature", "geometry": null, "properties": { "name": "No geometry" } },
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [200.0, 45.0] },
                  "properties": { "name": "Out of range" } },
                { "type": "Feature", "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] },
                  "properties": { "name": "Line" } },
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [1.0, 1.0] },
                  "properties": { "city": "Nameless" } }
            ]
        }"#;
        let collection = parse_collection(body).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.features[0].properties.name, "Good");
    }

    #[test]
    fn rejects_non_collections() {
        assert!(matches!(parse_collection("{}"), Err(LoadError::Parse(_))));
        assert!(matches!(
            parse_collection(r#"{"type":"Point","coordinates":[1.0,2.0]}"#),
            Err(LoadError::Parse(_))
        ));
    }

    #[test]
    fn parses_server_body() {
        let collection = parse_collection(BODY).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.features[1].coordinates(), [2.35, 48.85]);
    }

    #[test]
    fn fetcher_url_has_no_double_slash() {
        let fetcher = HttpFetcher::new(&LoaderConfig {
            base_url: "https://runclubs.example/".to_string(),
            ..LoaderConfig::default()
        })
        .unwrap();
        assert_eq!(fetcher.url(), "https://runclubs.example/api/runclubs");
    }

    #[tokio::test]
    async fn second_load_is_served_from_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let fetcher = Arc::new(StubFetcher::ok(collection(&["A", "B"])));
        let loader = DataLoader::new(fetcher.clone(), cache(clock), CacheOptions::default());

        let first = loader.load().await.unwrap();
        assert!(!first.from_cache);
        let second = loader.load().await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.collection, first.collection);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_cache_goes_back_to_network() {
        let clock = Arc::new(ManualClock::new(0));
        let fetcher = Arc::new(StubFetcher::ok(collection(&["A"])));
        let loader = DataLoader::new(fetcher.clone(), cache(clock.clone()), CacheOptions::default());

        loader.load().await.unwrap();
        clock.advance(CacheOptions::default().ttl_ms + 1);
        let again = loader.load().await.unwrap();
        assert!(!again.from_cache);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn network_failure_degrades_to_empty_and_is_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let fetcher = Arc::new(StubFetcher::failing(500));
        let loader = DataLoader::new(fetcher.clone(), cache(clock), CacheOptions::default());

        let loaded = loader.load().await.unwrap();
        assert!(loaded.collection.is_empty());
        assert!(!loader.cache_status().from_cache);

        loader.load().await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let fetcher = Arc::new(StubFetcher::ok(collection(&["A"])));
        let loader = DataLoader::new(fetcher.clone(), cache(clock), CacheOptions::default());

        loader.load().await.unwrap();
        let refreshed = loader.refresh().await.unwrap();
        assert!(!refreshed.from_cache);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_status_reports_age() {
        let clock = Arc::new(ManualClock::new(1_000));
        let fetcher = Arc::new(StubFetcher::ok(collection(&["A"])));
        let loader = DataLoader::new(fetcher, cache(clock.clone()), CacheOptions::default());

        assert_eq!(loader.cache_status(), CacheStatus::default());
        loader.load().await.unwrap();
        clock.advance(5 * 60 * 1000);

        let status = loader.cache_status();
        assert!(status.from_cache);
        assert_eq!(status.age_ms, Some(300_000));
        assert_eq!(status.last_update, Some(1_000));
        assert_eq!(status.total_items, 1);
    }

    /// Blocks its first call until released; later calls answer at once.
    struct GatedFetcher {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeatureFetcher for GatedFetcher {
        async fn fetch(&self) -> Result<FeatureCollection, LoadError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
                Ok(collection(&["Stale"]))
            } else {
                Ok(collection(&["Fresh"]))
            }
        }
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        let clock = Arc::new(ManualClock::new(0));
        let fetcher = Arc::new(GatedFetcher {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let loader = DataLoader::new(fetcher.clone(), cache(clock), CacheOptions::default());

        let (slow, fast) = tokio::join!(loader.load(), async {
            let loaded = loader.load().await;
            fetcher.gate.notify_one();
            loaded
        });

        assert!(matches!(slow, Err(LoadError::Superseded)));
        let fast = fast.unwrap();
        assert_eq!(fast.collection.features[0].properties.name, "Fresh");

        let cached: FeatureCollection = loader
            .cache()
            .get(keys::RUNCLUBS_DATA, &CacheOptions::default())
            .unwrap();
        assert_eq!(cached.features[0].properties.name, "Fresh");
    }
}
