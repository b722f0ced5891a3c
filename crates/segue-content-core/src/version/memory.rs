//! In-memory version store for tests and embedding.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{VersionInfo, VersionStore};
use crate::error::{StoreError, StoreResult};

struct Snapshot {
    info: VersionInfo,
    files: BTreeMap<String, Vec<u8>>,
}

/// Snapshots held in memory; the most recently committed one is head.
#[derive(Default)]
pub struct InMemoryVersionStore {
    snapshots: RwLock<Vec<Snapshot>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a snapshot stamped with the current time.
    pub fn commit<I, P, B>(&self, version: &str, files: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (P, B)>,
        P: Into<String>,
        B: Into<Vec<u8>>,
    {
        self.commit_at(version, Utc::now(), files)
    }

    pub fn commit_at<I, P, B>(
        &self,
        version: &str,
        committed_at: DateTime<Utc>,
        files: I,
    ) -> StoreResult<()>
    where
        I: IntoIterator<Item = (P, B)>,
        P: Into<String>,
        B: Into<Vec<u8>>,
    {
        let files = files
            .into_iter()
            .map(|(path, bytes)| (path.into(), bytes.into()))
            .collect();
        let mut snapshots = self.write()?;
        snapshots.retain(|s| s.info.id != version);
        snapshots.push(Snapshot {
            info: VersionInfo {
                id: version.to_string(),
                committed_at,
                summary: String::new(),
            },
            files,
        });
        Ok(())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Vec<Snapshot>>> {
        self.snapshots
            .read()
            .map_err(|_| StoreError::Access("version store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Vec<Snapshot>>> {
        self.snapshots
            .write()
            .map_err(|_| StoreError::Access("version store lock poisoned".to_string()))
    }

    fn with_snapshot<T>(
        &self,
        version: &str,
        f: impl FnOnce(&Snapshot) -> T,
    ) -> StoreResult<T> {
        let snapshots = self.read()?;
        snapshots
            .iter()
            .find(|s| s.info.id == version)
            .map(f)
            .ok_or_else(|| StoreError::UnknownVersion(version.to_string()))
    }
}

impl VersionStore for InMemoryVersionStore {
    fn read_object(&self, version: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_snapshot(version, |s| s.files.get(path).cloned())
    }

    fn list_objects(&self, version: &str, suffix: &str) -> StoreResult<Vec<String>> {
        self.with_snapshot(version, |s| {
            s.files
                .keys()
                .filter(|path| path.ends_with(suffix))
                .cloned()
                .collect()
        })
    }

    fn verify_version_exists(&self, version: &str) -> bool {
        self.read()
            .map(|snapshots| snapshots.iter().any(|s| s.info.id == version))
            .unwrap_or(false)
    }

    fn list_versions(&self) -> StoreResult<Vec<VersionInfo>> {
        Ok(self.read()?.iter().rev().map(|s| s.info.clone()).collect())
    }

    fn head_version(&self) -> StoreResult<String> {
        self.read()?
            .last()
            .map(|s| s.info.id.clone())
            .ok_or_else(|| StoreError::Access("repository has no versions".to_string()))
    }

    fn version_time(&self, version: &str) -> StoreResult<DateTime<Utc>> {
        self.with_snapshot(version, |s| s.info.committed_at)
    }
}
