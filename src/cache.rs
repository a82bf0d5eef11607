use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimal namespaced key-value store. The pipeline only ever needs
/// `get`/`set`; backing storage is pluggable.
pub trait CacheStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Option<serde_json::Value>;
    fn set(&self, namespace: &str, key: &str, value: &serde_json::Value);
}

/// Filesystem-backed store: one JSON file per key under a namespace
/// subdirectory, file name derived from the SHA-256 of the key so arbitrary
/// query text maps to a safe path. No eviction, no expiry; deleting the
/// cache root is the invalidation story.
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hex = hex::encode(hasher.finalize());
        self.root.join(namespace).join(format!("{hex}.json"))
    }

    fn read_entry(&self, path: &Path) -> anyhow::Result<serde_json::Value> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_entry(&self, path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec(value)?)?;
        Ok(())
    }
}

impl CacheStore for FsCacheStore {
    fn get(&self, namespace: &str, key: &str) -> Option<serde_json::Value> {
        let path = self.entry_path(namespace, key);
        if !path.exists() {
            return None;
        }
        match self.read_entry(&path) {
            Ok(value) => Some(value),
            Err(e) => {
                // A corrupt entry is a miss, never a failure.
                debug!("cache read failed for {}/{}: {}", namespace, key, e);
                None
            }
        }
    }

    fn set(&self, namespace: &str, key: &str, value: &serde_json::Value) {
        let path = self.entry_path(namespace, key);
        if let Err(e) = self.write_entry(&path, value) {
            warn!("cache write failed for {}/{}: {}", namespace, key, e);
        }
    }
}

/// Typed facade over a `CacheStore`. Serialization failures are treated the
/// same as storage failures: misses on read, logged no-ops on write.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn get_as<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let value = self.store.get(namespace, key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!("cache entry for {}/{} has a stale shape: {}", namespace, key, e);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, namespace: &str, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.store.set(namespace, key, &json),
            Err(e) => warn!("cache serialize failed for {}/{}: {}", namespace, key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(Arc::new(FsCacheStore::new(dir.path())));

        cache.put("geocode", "tower bridge, london", &serde_json::json!({"lat": 51.5}));
        let hit: Option<serde_json::Value> = cache.get_as("geocode", "tower bridge, london");
        assert_eq!(hit.unwrap()["lat"], 51.5);
    }

    #[test]
    fn test_miss_on_unknown_key_and_namespace_isolation() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(Arc::new(FsCacheStore::new(dir.path())));

        cache.put("identity", "tt0133093", &serde_json::json!({"tmdb_id": 603}));
        assert!(cache.get_as::<serde_json::Value>("identity", "tt0000000").is_none());
        assert!(cache.get_as::<serde_json::Value>("metadata", "tt0133093").is_none());
    }

    #[test]
    fn test_unwritable_root_fails_open() {
        // Points at a path that cannot be created; set must not panic and
        // get must report a miss.
        let store = FsCacheStore::new("/dev/null/not-a-dir");
        store.set("geocode", "k", &serde_json::json!(1));
        assert!(store.get("geocode", "k").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let path = store.entry_path("locations", "tt0111161");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json at all").unwrap();
        assert!(store.get("locations", "tt0111161").is_none());
    }
}
