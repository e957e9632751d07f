//! Two-tier TTL read cache.
//!
//! A hot in-process tier sits in front of a persisted tier that survives
//! restarts. Reads check the hot tier first and promote live persisted
//! entries into it; stale entries found along the way are evicted. A miss
//! is a normal `None`, never an error, and the persisted tier is strictly
//! best effort: storage failures are logged and swallowed.

pub mod keys;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub expire_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}

/// Backing store for the persisted tier. Implementations must be safe to
/// call from multiple threads; all operations are best effort.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Option<CacheEntry>;
    fn store(&self, key: &str, entry: &CacheEntry);
    fn remove(&self, key: &str);
    fn clear(&self);
    /// Removes every expired entry, returning how many were dropped.
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

/// Persisted tier held only in memory. Used in tests and in deployments
/// that do not want cross-restart caching.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    fn store(&self, key: &str, entry: &CacheEntry) {
        self.entries.lock().insert(key.to_string(), entry.clone());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

/// Persisted tier backed by a JSON snapshot on disk. The whole map is
/// rewritten on every mutation; entry counts here are small (cached remote
/// queries, not bulk data).
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!("discarding unreadable cache file {}: {err}", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Default location under the platform cache directory.
    pub fn open_default() -> Self {
        let dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::open(dir.join("review-engine").join("cache.json"))
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!("failed to create cache directory {}: {err}", parent.display());
                return;
            }
        }
        match serde_json::to_vec(entries) {
            Ok(raw) => {
                if let Err(err) = fs::write(&self.path, raw) {
                    warn!("failed to write cache file {}: {err}", self.path.display());
                }
            }
            Err(err) => warn!("failed to encode cache entries: {err}"),
        }
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    fn store(&self, key: &str, entry: &CacheEntry) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), entry.clone());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries);
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let dropped = before - entries.len();
        if dropped > 0 {
            self.persist(&entries);
        }
        dropped
    }
}

/// The two-tier cache. One coarse lock guards the hot tier so sweeps and
/// reads never observe a half-written entry.
pub struct TieredCache {
    hot: Mutex<HashMap<String, CacheEntry>>,
    store: Box<dyn CacheStore>,
    default_ttl: Duration,
}

impl TieredCache {
    pub fn new(store: Box<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self {
            hot: Mutex::new(HashMap::new()),
            store,
            default_ttl,
        }
    }

    /// Writes to both tiers. `ttl` falls back to the configured default.
    pub fn put(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expire_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(300));
        let entry = CacheEntry { value, expire_at };
        self.hot.lock().insert(key.to_string(), entry.clone());
        self.store.store(key, &entry);
    }

    /// Hot tier first, then the persisted tier with promotion. Stale
    /// entries found on the way are evicted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Utc::now();

        let mut hot = self.hot.lock();
        match hot.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {
                hot.remove(key);
            }
            None => {}
        }

        match self.store.load(key) {
            Some(entry) if !entry.is_expired(now) => {
                hot.insert(key.to_string(), entry.clone());
                Some(entry.value)
            }
            Some(_) => {
                self.store.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.hot.lock().remove(key);
        self.store.remove(key);
    }

    pub fn clear(&self) {
        self.hot.lock().clear();
        self.store.clear();
    }

    /// Drops every expired entry from both tiers.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let hot_dropped = {
            let mut hot = self.hot.lock();
            let before = hot.len();
            hot.retain(|_, entry| !entry.is_expired(now));
            before - hot.len()
        };
        let store_dropped = self.store.sweep(now);
        if hot_dropped + store_dropped > 0 {
            debug!("cache sweep dropped {hot_dropped} hot / {store_dropped} persisted entries");
        }
        hot_dropped + store_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> TieredCache {
        TieredCache::new(Box::new(MemoryStore::new()), Duration::from_secs(300))
    }

    #[test]
    fn put_then_get_within_ttl() {
        let cache = cache();
        cache.put("k", json!({"v": 1}), Some(Duration::from_millis(100)));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("k"), Some(json!({"v": 1})));
    }

    #[test]
    fn get_after_ttl_misses() {
        let cache = cache();
        cache.put("k", json!("v"), Some(Duration::from_millis(100)));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn persisted_entry_promotes_into_hot_tier() {
        let store = MemoryStore::new();
        store.store(
            "k",
            &CacheEntry {
                value: json!("persisted"),
                expire_at: Utc::now() + chrono::Duration::minutes(5),
            },
        );
        let cache = TieredCache::new(Box::new(store), Duration::from_secs(300));
        assert_eq!(cache.get("k"), Some(json!("persisted")));
        // Now present in the hot tier as well.
        assert!(cache.hot.lock().contains_key("k"));
    }

    #[test]
    fn invalidate_removes_from_both_tiers() {
        let cache = cache();
        cache.put("k", json!("v"), None);
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
        assert!(cache.store.load("k").is_none());
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let cache = cache();
        cache.put("dead", json!(1), Some(Duration::from_millis(10)));
        cache.put("live", json!(2), Some(Duration::from_secs(300)));
        std::thread::sleep(Duration::from_millis(30));
        let dropped = cache.sweep_expired();
        assert_eq!(dropped, 2); // hot + persisted copy of "dead"
        assert_eq!(cache.get("live"), Some(json!(2)));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let cache =
                TieredCache::new(Box::new(JsonFileStore::open(&path)), Duration::from_secs(300));
            cache.put("k", json!("durable"), None);
        }

        let reopened =
            TieredCache::new(Box::new(JsonFileStore::open(&path)), Duration::from_secs(300));
        assert_eq!(reopened.get("k"), Some(json!("durable")));
    }

    #[test]
    fn file_store_tolerates_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = JsonFileStore::open(&path);
        assert!(store.load("k").is_none());
    }
}
