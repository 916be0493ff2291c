//! Bounded LRU result caches with JSON file persistence.
//!
//! The engine keeps three of these: search results, AI overviews, and AI
//! summaries. Each cache is a capacity-bounded map whose recency order is
//! updated on every hit and insert. Persistence is best-effort: the cache
//! is flushed to its JSON file every `CACHE_SAVE_INTERVAL` puts and on
//! drop, and a corrupt or missing file just starts the cache empty.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Capacity of the search result cache.
pub const SEARCH_CACHE_CAPACITY: usize = 2600;

/// Capacity of the AI overview cache.
pub const AI_OVERVIEW_CACHE_CAPACITY: usize = 500;

/// Capacity of the AI summary cache.
pub const AI_SUMMARY_CACHE_CAPACITY: usize = 1000;

/// Puts between persisted snapshots. The in-memory cache is always
/// current; only durability is coalesced.
pub const CACHE_SAVE_INTERVAL: usize = 32;

pub const SEARCH_CACHE_FILE: &str = "search_cache.json";
pub const AI_OVERVIEW_CACHE_FILE: &str = "ai_overview_cache.json";
pub const AI_SUMMARY_CACHE_FILE: &str = "ai_summary_cache.json";

/// One persisted cache entry.
#[derive(Serialize, Deserialize)]
struct CacheRecord<V> {
    key: String,
    result: V,
}

/// A bounded LRU map persisted as a JSON array of `{key, result}`.
pub struct LruCache<V> {
    path: PathBuf,
    capacity: usize,
    map: HashMap<String, V>,
    /// Keys from least to most recently used.
    order: Vec<String>,
    puts_since_save: usize,
    dirty: bool,
}

impl<V: Serialize + DeserializeOwned + Clone> LruCache<V> {
    /// Open a cache backed by `path`, restoring persisted entries if the
    /// file exists. Entries load oldest-first so recency order survives a
    /// restart.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let mut cache = Self {
            path,
            capacity: capacity.max(1),
            map: HashMap::new(),
            order: Vec::new(),
            puts_since_save: 0,
            dirty: false,
        };
        cache.load();
        cache
    }

    fn load(&mut self) {
        if !self.path.exists() {
            return;
        }
        let records: Vec<CacheRecord<V>> = match File::open(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|f| {
                serde_json::from_reader(BufReader::new(f)).map_err(|e| e.to_string())
            }) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache file unreadable, starting empty");
                return;
            }
        };

        for record in records {
            if self.map.contains_key(&record.key) {
                continue;
            }
            self.map.insert(record.key.clone(), record.result);
            self.order.push(record.key);
        }
        while self.order.len() > self.capacity {
            let evicted = self.order.remove(0);
            self.map.remove(&evicted);
        }
        info!(path = %self.path.display(), entries = self.map.len(), "cache loaded");
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    /// Look up a key; a hit promotes it to most recently used and returns
    /// a copy of the value.
    pub fn get(&mut self, key: &str) -> Option<V> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.map.get(key).cloned()
    }

    /// Insert or update a key at the most recently used position, evicting
    /// the least recently used entry when at capacity.
    pub fn put(&mut self, key: &str, value: V) {
        if self.map.contains_key(key) {
            self.map.insert(key.to_string(), value);
            self.touch(key);
        } else {
            if self.map.len() >= self.capacity {
                let evicted = self.order.remove(0);
                self.map.remove(&evicted);
            }
            self.map.insert(key.to_string(), value);
            self.order.push(key.to_string());
        }

        self.dirty = true;
        self.puts_since_save += 1;
        if self.puts_since_save >= CACHE_SAVE_INTERVAL {
            self.save();
        }
    }

    /// Persist the cache oldest-first. Errors are logged, never raised;
    /// caches are a best-effort layer.
    pub fn save(&mut self) {
        let records: Vec<CacheRecord<&V>> = self
            .order
            .iter()
            .filter_map(|key| {
                self.map.get(key).map(|result| CacheRecord {
                    key: key.clone(),
                    result,
                })
            })
            .collect();

        let write = File::create(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|f| {
                serde_json::to_writer_pretty(BufWriter::new(f), &records).map_err(|e| e.to_string())
            });
        match write {
            Ok(()) => {
                self.dirty = false;
                self.puts_since_save = 0;
                info!(path = %self.path.display(), entries = records.len(), "cache saved");
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to save cache"),
        }
    }

    /// Persist only if there are unsaved updates.
    pub fn flush(&mut self) {
        if self.dirty {
            self.save();
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Cache key for a search: `"<query>|<k>"`.
pub fn search_cache_key(query: &str, k: u32) -> String {
    format!("{}|{}", query, k)
}

/// Cache key for an AI summary: `"summary|<cord_uid>"`.
pub fn summary_cache_key(cord_uid: &str) -> String {
    format!("summary|{}", cord_uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn cache_at(dir: &TempDir, capacity: usize) -> LruCache<Value> {
        LruCache::open(dir.path().join("cache.json"), capacity)
    }

    #[test]
    fn test_get_miss() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_at(&tmp, 4);
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn test_put_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_at(&tmp, 4);
        cache.put("k1", json!({"v": 1}));
        assert_eq!(cache.get("k1").unwrap()["v"], 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_at(&tmp, 2);

        cache.put("k1", json!(1));
        cache.put("k2", json!(2));
        // Touch k1 so k2 becomes least recently used.
        assert!(cache.get("k1").is_some());
        cache.put("k3", json!(3));

        assert!(cache.get("k2").is_none());
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k3").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_update_existing_key_keeps_size() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_at(&tmp, 2);
        cache.put("k1", json!(1));
        cache.put("k2", json!(2));
        cache.put("k1", json!(10));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("k1").unwrap(), json!(10));
        // k1 became MRU, so inserting a third key evicts k2.
        cache.put("k3", json!(3));
        assert!(cache.get("k2").is_none());
    }

    #[test]
    fn test_capacity_bound_under_churn() {
        let tmp = TempDir::new().unwrap();
        let mut cache = cache_at(&tmp, 8);
        for i in 0..100 {
            cache.put(&format!("k{}", i), json!(i));
            assert!(cache.len() <= 8);
        }
    }

    #[test]
    fn test_persistence_roundtrip_preserves_recency() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        {
            let mut cache: LruCache<Value> = LruCache::open(&path, 2);
            cache.put("k1", json!(1));
            cache.put("k2", json!(2));
            assert!(cache.get("k1").is_some());
            cache.flush();
        }

        let mut cache: LruCache<Value> = LruCache::open(&path, 2);
        assert_eq!(cache.len(), 2);
        // k2 was LRU at save time; a new insert evicts it first.
        cache.put("k3", json!(3));
        assert!(cache.get("k2").is_none());
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache: LruCache<Value> = LruCache::open(&path, 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(search_cache_key("covid vaccine", 10), "covid vaccine|10");
        assert_eq!(summary_cache_key("ug7v899j"), "summary|ug7v899j");
    }
}
