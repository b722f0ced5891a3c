//! Builds per-version search indices from the version store.
//!
//! # Index layout
//!
//! | Index type | Document id | Body |
//! |------------|-------------|------|
//! | `metadata` | `general` | `{"version", "created"}` |
//! | `metadata` | `tags` | `{"tags": [..]}` |
//! | `unit` / `publishedUnit` | clean key | `{"cleanKey", "unit"}` |
//! | `contentError` | source file and id | problem entry |
//! | `content` | content id | canonical content document |
//!
//! The content index is written last, in a single bulk call. Its existence
//! is what marks a version as indexed, so readers never observe a version
//! whose content index is missing documents.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use segue_content_core::error::{ContentError, SearchError};
use segue_content_core::loader::VersionSnapshot;
use segue_content_core::search::{
    IndexDocument, IndexType, SearchProvider, LATEST_ALIAS, LIVE_ALIAS,
};
use segue_content_core::validate::ProblemKind;

use crate::source::ContentSource;

/// Summary of one `build_index` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOutcome {
    pub version: String,
    /// The version was already indexed and nothing was written.
    pub already_indexed: bool,
    pub objects: usize,
    pub tags: usize,
    pub units: usize,
    pub problems: usize,
}

impl IndexOutcome {
    fn existing(version: &str) -> Self {
        Self {
            version: version.to_string(),
            already_indexed: true,
            objects: 0,
            tags: 0,
            units: 0,
            problems: 0,
        }
    }
}

pub struct ContentIndexer {
    source: ContentSource,
    search: Arc<dyn SearchProvider>,
    build_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContentIndexer {
    pub fn new(source: ContentSource, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            source,
            search,
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    fn build_lock(&self, version: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(version.to_string()).or_default().clone()
    }

    /// Indexes `version` unless it is already indexed.
    ///
    /// Concurrent calls for the same version are serialized; the second
    /// caller finds the index present and returns without writing.
    pub async fn build_index(&self, version: &str) -> Result<IndexOutcome, ContentError> {
        if self.search.is_version_indexed(version).await? {
            info!(version, "Version already indexed");
            return Ok(IndexOutcome::existing(version));
        }

        let lock = self.build_lock(version);
        let _guard = lock.lock().await;

        if self.search.is_version_indexed(version).await? {
            info!(version, "Version indexed while waiting for build lock");
            return Ok(IndexOutcome::existing(version));
        }

        info!(version, "Building content index");
        let mut snapshot = self.source.load(version).await?;
        let outcome = self.write_snapshot(&mut snapshot).await?;
        self.search.add_or_move_alias(LATEST_ALIAS, version).await?;

        info!(
            version,
            objects = outcome.objects,
            tags = outcome.tags,
            units = outcome.units,
            problems = outcome.problems,
            "Content index built"
        );
        Ok(outcome)
    }

    /// Builds `version` if needed and points the `live` alias at it.
    pub async fn set_live(&self, version: &str) -> Result<IndexOutcome, ContentError> {
        let outcome = self.build_index(version).await?;
        self.search.add_or_move_alias(LIVE_ALIAS, version).await?;
        info!(version, "Live version updated");
        Ok(outcome)
    }

    /// Deletes every index of `version`.
    pub async fn expunge(&self, version: &str) -> Result<(), ContentError> {
        self.search.expunge_index(version).await?;
        info!(version, "Version indices expunged");
        Ok(())
    }

    async fn write_snapshot(
        &self,
        snapshot: &mut VersionSnapshot,
    ) -> Result<IndexOutcome, ContentError> {
        let version = snapshot.version.clone();
        let search = self.search.as_ref();

        // Serialize content first so failures land in the error index
        let mut content_docs = Vec::with_capacity(snapshot.contents.len());
        let mut failures = Vec::new();
        for (id, content) in &snapshot.contents {
            match content.to_document() {
                Ok(body) => content_docs.push(IndexDocument::new(id.clone(), body)),
                Err(e) => {
                    warn!(version = %version, id = %id, error = %e, "Unable to serialize content");
                    failures.push((content.clone(), e.to_string()));
                }
            }
        }
        for (content, message) in failures {
            snapshot.problems.record(
                &content,
                ProblemKind::Serialization,
                format!("Unable to serialize content for indexing: {}", message),
            );
        }

        let general = json!({
            "version": version,
            "created": Utc::now().to_rfc3339(),
        });
        search
            .index_object(&version, IndexType::Metadata, "general", &general)
            .await?;
        search
            .index_object(
                &version,
                IndexType::Metadata,
                "tags",
                &json!({ "tags": snapshot.tags }),
            )
            .await?;

        let unit_docs = |units: &std::collections::BTreeMap<String, String>| -> Vec<IndexDocument> {
            units
                .iter()
                .map(|(key, unit)| {
                    IndexDocument::new(key.clone(), json!({ "cleanKey": key, "unit": unit }))
                })
                .collect()
        };
        search
            .bulk_index(&version, IndexType::Unit, &unit_docs(&snapshot.units))
            .await?;
        search
            .bulk_index(
                &version,
                IndexType::PublishedUnit,
                &unit_docs(&snapshot.published_units),
            )
            .await?;

        let error_docs = snapshot
            .problems
            .entries()
            .map(|entry| {
                let id = format!(
                    "{}#{}",
                    entry.canonical_source_file,
                    entry.id.as_deref().unwrap_or_default()
                );
                serde_json::to_value(entry)
                    .map(|body| IndexDocument::new(id, body))
                    .map_err(SearchError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        search
            .bulk_index(&version, IndexType::ContentError, &error_docs)
            .await?;

        search
            .bulk_index(&version, IndexType::Content, &content_docs)
            .await?;

        Ok(IndexOutcome {
            version,
            already_indexed: false,
            objects: content_docs.len(),
            tags: snapshot.tags.len(),
            units: snapshot.units.len(),
            problems: snapshot.problems.problem_count(),
        })
    }
}
