//! Version-addressed object store abstraction.
//!
//! A version is an immutable snapshot of the content tree, identified by an
//! opaque string (a git commit SHA for the git backend). Objects inside a
//! snapshot are addressed by path.
//!
//! The trait is synchronous: backends shell out or read memory, and async
//! callers move whole loads onto a blocking thread.

mod caching;
mod memory;

pub use caching::CachingVersionStore;
pub use memory::InMemoryVersionStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// One entry of the version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub id: String,
    pub committed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

pub trait VersionStore: Send + Sync {
    /// Bytes of the object at exactly `path`, or `None` when absent.
    fn read_object(&self, version: &str, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Every object path at `version` ending with `suffix`, sorted.
    fn list_objects(&self, version: &str, suffix: &str) -> StoreResult<Vec<String>>;

    /// Whether `version` names a snapshot. Never fails.
    fn verify_version_exists(&self, version: &str) -> bool;

    /// Version history, most recent first.
    fn list_versions(&self) -> StoreResult<Vec<VersionInfo>>;

    /// The newest version of the tracked branch.
    fn head_version(&self) -> StoreResult<String>;

    fn version_time(&self, version: &str) -> StoreResult<DateTime<Utc>>;

    /// Resolves a path or trailing path segments to exactly one object.
    ///
    /// An object at exactly `path_or_suffix` always wins. Otherwise a
    /// candidate matches only on a segment boundary, so `a.png` finds
    /// `figures/a.png` but never `figures/data.png`. Zero matches yield
    /// `Ok(None)`; more than one is [`StoreError::Ambiguous`].
    fn resolve_object(&self, version: &str, path_or_suffix: &str) -> StoreResult<Option<Vec<u8>>> {
        let pattern = path_or_suffix.trim_start_matches('/');
        if pattern.is_empty() {
            return Ok(None);
        }
        if let Some(bytes) = self.read_object(version, pattern)? {
            return Ok(Some(bytes));
        }

        let boundary = format!("/{}", pattern);
        let mut matches: Vec<String> = self
            .list_objects(version, &boundary)?
            .into_iter()
            .filter(|path| path.ends_with(&boundary))
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => {
                let path = matches.remove(0);
                self.read_object(version, &path)
            }
            _ => Err(StoreError::Ambiguous {
                version: version.to_string(),
                pattern: pattern.to_string(),
                matches,
            }),
        }
    }

    fn object_exists(&self, version: &str, path: &str) -> StoreResult<bool> {
        Ok(self.read_object(version, path)?.is_some())
    }
}
