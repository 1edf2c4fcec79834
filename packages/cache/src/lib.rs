#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Namespaced TTL cache.
//!
//! Entries are JSON envelopes (`{data, timestamp, version}`) written to a
//! [`Store`] under `"{namespace}:{key}"`. The cache also keeps an index of
//! the keys it wrote, so clearing and expiry never scan keys it does not
//! own.
//!
//! Reads never fail: a missing, expired, version-mismatched or unparseable
//! entry is a miss, and everything but a missing one is purged on the
//! way.

pub mod clock;
pub mod store;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{FileStore, MemoryStore, Store};

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "runclub-map";

/// Default entry lifetime: 30 minutes.
pub const DEFAULT_TTL_MS: i64 = 30 * 60 * 1000;

/// Default payload schema version.
pub const DEFAULT_VERSION: &str = "1.0.0";

const INDEX_KEY: &str = "__index";

/// Reserved keys.
pub mod keys {
    /// The published club collection.
    pub const RUNCLUBS_DATA: &str = "runclubs-data";
    /// Language and display preferences.
    pub const USER_PREFERENCES: &str = "user-preferences";
    /// The filters last applied.
    pub const LAST_FILTERS: &str = "last-filters";
}

/// Errors from the cache and its backends.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend I/O failed.
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be (de)serialized.
    #[error("Cache JSON failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend has no room left for `key`.
    #[error("Cache store full while writing {key}")]
    Full {
        /// Key being written.
        key: String,
    },

    /// A lock guarding the backend was poisoned.
    #[error("Cache store lock poisoned")]
    Poisoned,

    /// `key` is used by the cache itself.
    #[error("Cache key {key} is reserved")]
    ReservedKey {
        /// Key that was refused.
        key: String,
    },
}

fn check_key(key: &str) -> Result<(), CacheError> {
    if key == INDEX_KEY {
        return Err(CacheError::ReservedKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Lifetime and schema version for one read or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Milliseconds an entry stays valid.
    pub ttl_ms: i64,
    /// Expected payload schema version.
    pub version: String,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl CacheOptions {
    /// Options for [`keys::RUNCLUBS_DATA`].
    #[must_use]
    pub fn club_data() -> Self {
        Self::default()
    }

    /// Options for [`keys::USER_PREFERENCES`]: 7 days.
    #[must_use]
    pub fn user_preferences() -> Self {
        Self {
            ttl_ms: 7 * 24 * 60 * 60 * 1000,
            ..Self::default()
        }
    }

    /// Options for [`keys::LAST_FILTERS`]: 24 hours.
    #[must_use]
    pub fn last_filters() -> Self {
        Self {
            ttl_ms: 24 * 60 * 60 * 1000,
            ..Self::default()
        }
    }
}

/// A stored payload with its write time and schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry<T> {
    /// The payload.
    pub data: T,
    /// Write time, epoch milliseconds.
    pub timestamp: i64,
    /// Schema version the payload was written with.
    pub version: String,
}

#[derive(Deserialize)]
struct EntryHeader {
    timestamp: i64,
}

/// Summary of what the cache currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Indexed entries still present in the store.
    pub total_items: usize,
    /// Serialized size of those entries.
    pub total_bytes: usize,
    /// Oldest entry and its age in milliseconds.
    pub oldest: Option<(String, i64)>,
}

/// TTL cache over a [`Store`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    namespace: String,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Creates a cache in [`DEFAULT_NAMESPACE`] using the wall clock.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), DEFAULT_NAMESPACE)
    }

    /// Creates a cache with an explicit clock and namespace.
    #[must_use]
    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>, namespace: &str) -> Self {
        Self {
            store,
            clock,
            namespace: namespace.to_string(),
        }
    }

    /// Current time according to the cache's clock.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    /// Keys written through this cache and not removed since.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<String> {
        let raw = match self.store.get(&self.full_key(INDEX_KEY)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeSet::new(),
            Err(e) => {
                log::warn!("Failed to read cache index: {e}");
                return BTreeSet::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("Cache index is corrupt, starting over: {e}");
            BTreeSet::new()
        })
    }

    fn write_index(&self, keys: &BTreeSet<String>) -> Result<(), CacheError> {
        let raw = serde_json::to_string(keys)?;
        self.store.set(&self.full_key(INDEX_KEY), &raw)
    }

    /// Live entry under `key`, envelope included.
    #[must_use]
    pub fn get_entry<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Option<CachedEntry<T>> {
        if let Err(e) = check_key(key) {
            log::warn!("{e}");
            return None;
        }
        let raw = match self.store.get(&self.full_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::debug!("Cache miss: {key}");
                return None;
            }
            Err(e) => {
                log::warn!("Failed to read cache entry {key}: {e}");
                return None;
            }
        };

        let entry: CachedEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Cache entry {key} is corrupt, purging: {e}");
                self.purge(key);
                return None;
            }
        };

        if entry.version != options.version {
            log::info!(
                "Cache entry {key} has version {}, expected {}; purging",
                entry.version,
                options.version
            );
            self.purge(key);
            return None;
        }

        let age = self.now_millis() - entry.timestamp;
        if age > options.ttl_ms {
            log::info!("Cache entry {key} expired ({} min old)", age / 60_000);
            self.purge(key);
            return None;
        }

        log::debug!("Cache hit: {key} ({} min old)", age / 60_000);
        Some(entry)
    }

    /// Live payload under `key`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str, options: &CacheOptions) -> Option<T> {
        self.get_entry(key, options).map(|entry| entry.data)
    }

    /// Whether a live entry exists under `key`.
    #[must_use]
    pub fn has(&self, key: &str, options: &CacheOptions) -> bool {
        self.get_entry::<serde_json::Value>(key, options).is_some()
    }

    /// Stores `data` under `key` stamped with the current time.
    ///
    /// When the store refuses the write, expired entries are cleared and
    /// the write is retried once.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ReservedKey`] for the index key, or
    /// [`CacheError`] if the payload cannot be serialized or the retried
    /// write still fails.
    pub fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        options: &CacheOptions,
    ) -> Result<(), CacheError> {
        check_key(key)?;
        let entry = CachedEntry {
            data,
            timestamp: self.now_millis(),
            version: options.version.clone(),
        };
        let raw = serde_json::to_string(&entry)?;
        let full_key = self.full_key(key);

        if let Err(e) = self.store.set(&full_key, &raw) {
            log::warn!("Failed to write cache entry {key}: {e}; clearing expired entries");
            self.clear_expired(DEFAULT_TTL_MS);
            self.store.set(&full_key, &raw)?;
        }

        let mut keys = self.keys();
        if keys.insert(key.to_string()) {
            self.write_index(&keys)?;
        }

        log::debug!("Cached {key} ({} bytes)", raw.len());
        Ok(())
    }

    fn purge(&self, key: &str) {
        if let Err(e) = self.remove(key) {
            log::warn!("Failed to purge cache entry {key}: {e}");
        }
    }

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ReservedKey`] for the index key, or
    /// [`CacheError`] if the store cannot be written.
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        check_key(key)?;
        self.store.remove(&self.full_key(key))?;
        let mut keys = self.keys();
        if keys.remove(key) {
            self.write_index(&keys)?;
        }
        Ok(())
    }

    /// Deletes every entry this cache owns. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be written.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let keys = self.keys();
        for key in &keys {
            self.store.remove(&self.full_key(key))?;
        }
        self.store.remove(&self.full_key(INDEX_KEY))?;
        log::info!("Cleared {} cache entries", keys.len());
        Ok(keys.len())
    }

    /// Deletes entries older than `ttl_ms`, plus any that no longer parse.
    /// Returns how many were removed.
    pub fn clear_expired(&self, ttl_ms: i64) -> usize {
        let now = self.now_millis();
        let mut keys = self.keys();
        let mut removed = Vec::new();

        for key in &keys {
            let expired = match self.store.get(&self.full_key(key)) {
                Ok(Some(raw)) => serde_json::from_str::<EntryHeader>(&raw)
                    .map_or(true, |header| now - header.timestamp > ttl_ms),
                Ok(None) => true,
                Err(e) => {
                    log::warn!("Failed to read cache entry {key}: {e}");
                    false
                }
            };
            if expired {
                removed.push(key.clone());
            }
        }

        for key in &removed {
            if let Err(e) = self.store.remove(&self.full_key(key)) {
                log::warn!("Failed to remove expired cache entry {key}: {e}");
                continue;
            }
            keys.remove(key);
            log::debug!("Removed expired cache entry {key}");
        }

        if !removed.is_empty() {
            if let Err(e) = self.write_index(&keys) {
                log::warn!("Failed to write cache index: {e}");
            }
            log::info!("Removed {} expired cache entries", removed.len());
        }

        removed.len()
    }

    /// Counts, sizes and the oldest entry of what this cache owns.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = self.now_millis();
        let mut stats = CacheStats::default();
        let mut oldest: Option<(String, i64)> = None;

        for key in self.keys() {
            let Ok(Some(raw)) = self.store.get(&self.full_key(&key)) else {
                continue;
            };
            stats.total_items += 1;
            stats.total_bytes += raw.len();

            let Ok(header) = serde_json::from_str::<EntryHeader>(&raw) else {
                continue;
            };
            if oldest.as_ref().is_none_or(|(_, ts)| header.timestamp < *ts) {
                oldest = Some((key, header.timestamp));
            }
        }

        stats.oldest = oldest.map(|(key, ts)| (key, now - ts));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (Cache, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new());
        let cache = Cache::with_clock(store.clone(), clock.clone(), "test");
        (cache, clock, store)
    }

    #[test]
    fn index_key_cannot_be_used_for_entries() {
        let (cache, _clock, _store) = cache();
        let options = CacheOptions::default();
        cache.set("a", &1, &options).unwrap();

        assert!(matches!(
            cache.set(INDEX_KEY, &"overwrite", &options),
            Err(CacheError::ReservedKey { .. })
        ));
        assert!(cache.get::<serde_json::Value>(INDEX_KEY, &options).is_none());
        assert!(matches!(
            cache.remove(INDEX_KEY),
            Err(CacheError::ReservedKey { .. })
        ));

        assert_eq!(cache.keys(), BTreeSet::from(["a".to_string()]));
        assert_eq!(cache.get::<i32>("a", &options), Some(1));
    }

    #[test]
    fn fresh_entries_are_served() {
        let (cache, clock, _) = cache();
        let options = CacheOptions::default();
        cache.set("k", &vec![1, 2, 3], &options).unwrap();
        clock.advance(DEFAULT_TTL_MS);
        assert_eq!(cache.get::<Vec<i32>>("k", &options), Some(vec![1, 2, 3]));
    }

    #[test]
    fn expired_entries_miss_and_are_purged() {
        let (cache, clock, store) = cache();
        let options = CacheOptions::default();
        cache.set("k", &"value", &options).unwrap();
        clock.advance(DEFAULT_TTL_MS + 1);

        assert_eq!(cache.get::<String>("k", &options), None);
        assert_eq!(store.get("test:k").unwrap(), None);
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let (cache, _, store) = cache();
        cache.set("k", &"old", &CacheOptions::default()).unwrap();

        let bumped = CacheOptions {
            version: "2.0.0".to_string(),
            ..CacheOptions::default()
        };
        assert_eq!(cache.get::<String>("k", &bumped), None);
        assert_eq!(store.get("test:k").unwrap(), None);
    }

    #[test]
    fn corrupt_entry_is_a_miss_and_purged() {
        let (cache, _, store) = cache();
        cache.set("k", &"ok", &CacheOptions::default()).unwrap();
        store.set("test:k", "{not json").unwrap();

        assert_eq!(cache.get::<String>("k", &CacheOptions::default()), None);
        assert_eq!(store.get("test:k").unwrap(), None);
    }

    #[test]
    fn wrong_payload_shape_is_a_miss() {
        let (cache, _, _) = cache();
        cache.set("k", &"text", &CacheOptions::default()).unwrap();
        assert_eq!(cache.get::<Vec<u8>>("k", &CacheOptions::default()), None);
    }

    #[test]
    fn clear_only_touches_owned_keys() {
        let (cache, _, store) = cache();
        store.set("someone-else", "keep").unwrap();
        cache.set(keys::RUNCLUBS_DATA, &1, &CacheOptions::default()).unwrap();
        cache.set(keys::LAST_FILTERS, &2, &CacheOptions::last_filters()).unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.keys().is_empty());
        assert_eq!(store.get("someone-else").unwrap().as_deref(), Some("keep"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_expired_keeps_live_entries() {
        let (cache, clock, _) = cache();
        cache.set("old", &1, &CacheOptions::default()).unwrap();
        clock.advance(20 * 60 * 1000);
        cache.set("new", &2, &CacheOptions::default()).unwrap();
        clock.advance(15 * 60 * 1000);

        assert_eq!(cache.clear_expired(DEFAULT_TTL_MS), 1);
        assert_eq!(cache.keys(), BTreeSet::from(["new".to_string()]));
    }

    #[test]
    fn stats_report_oldest_entry() {
        let (cache, clock, _) = cache();
        cache.set("a", &1, &CacheOptions::default()).unwrap();
        clock.advance(60_000);
        cache.set("b", &2, &CacheOptions::default()).unwrap();
        clock.advance(60_000);

        let stats = cache.stats();
        assert_eq!(stats.total_items, 2);
        assert!(stats.total_bytes > 0);
        assert_eq!(stats.oldest, Some(("a".to_string(), 120_000)));
    }

    #[test]
    fn full_store_clears_expired_and_retries() {
        let clock = Arc::new(ManualClock::new(0));
        let payload = "x".repeat(100);
        let store = Arc::new(MemoryStore::with_capacity(400));
        let cache = Cache::with_clock(store.clone(), clock.clone(), "test");

        cache.set("stale", &payload, &CacheOptions::default()).unwrap();
        clock.advance(DEFAULT_TTL_MS + 1);
        cache.set("fresh", &payload, &CacheOptions::default()).unwrap();
        cache.set("fresher", &payload, &CacheOptions::default()).unwrap();

        assert!(!cache.keys().contains("stale"));
        assert!(cache.has("fresher", &CacheOptions::default()));
    }

    #[test]
    fn reserved_key_lifetimes() {
        assert_eq!(CacheOptions::club_data().ttl_ms, 1_800_000);
        assert_eq!(CacheOptions::user_preferences().ttl_ms, 604_800_000);
        assert_eq!(CacheOptions::last_filters().ttl_ms, 86_400_000);
        assert_eq!(CacheOptions::default().version, "1.0.0");
    }
}
