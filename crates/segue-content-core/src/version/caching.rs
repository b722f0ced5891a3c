//! Memoizing wrapper around a version store.
//!
//! Snapshots are immutable, so object reads and listings for a given
//! `(version, path)` can be cached indefinitely. History and head lookups
//! always go to the inner store.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{VersionInfo, VersionStore};
use crate::error::StoreResult;

type Key = (String, String);

pub struct CachingVersionStore<S> {
    inner: S,
    objects: RwLock<HashMap<Key, Option<Vec<u8>>>>,
    listings: RwLock<HashMap<Key, Vec<String>>>,
}

impl<S: VersionStore> CachingVersionStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            objects: RwLock::new(HashMap::new()),
            listings: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of memoized object reads.
    pub fn cached_objects(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }
}

fn lookup<V: Clone>(cache: &RwLock<HashMap<Key, V>>, key: &Key) -> Option<V> {
    cache.read().ok().and_then(|m| m.get(key).cloned())
}

fn remember<V>(cache: &RwLock<HashMap<Key, V>>, key: Key, value: V) {
    if let Ok(mut m) = cache.write() {
        m.insert(key, value);
    }
}

impl<S: VersionStore> VersionStore for CachingVersionStore<S> {
    fn read_object(&self, version: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = (version.to_string(), path.to_string());
        if let Some(hit) = lookup(&self.objects, &key) {
            return Ok(hit);
        }
        let bytes = self.inner.read_object(version, path)?;
        debug!(version, path, "Caching object read");
        remember(&self.objects, key, bytes.clone());
        Ok(bytes)
    }

    fn list_objects(&self, version: &str, suffix: &str) -> StoreResult<Vec<String>> {
        let key = (version.to_string(), suffix.to_string());
        if let Some(hit) = lookup(&self.listings, &key) {
            return Ok(hit);
        }
        let paths = self.inner.list_objects(version, suffix)?;
        remember(&self.listings, key, paths.clone());
        Ok(paths)
    }

    fn verify_version_exists(&self, version: &str) -> bool {
        self.inner.verify_version_exists(version)
    }

    fn list_versions(&self) -> StoreResult<Vec<VersionInfo>> {
        self.inner.list_versions()
    }

    fn head_version(&self) -> StoreResult<String> {
        self.inner.head_version()
    }

    fn version_time(&self, version: &str) -> StoreResult<DateTime<Utc>> {
        self.inner.version_time(version)
    }
}
