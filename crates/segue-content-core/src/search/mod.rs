//! Search provider abstraction.
//!
//! Indices are addressed by `(version, index type)`. The [`SearchProvider`]
//! trait covers everything the indexer writes and the content manager reads;
//! backends share the ranking rules in [`ranking`] so results are identical
//! whichever backend is configured.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod ranking;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SearchResult;

pub use memory::InMemorySearchProvider;

/// Alias always pointing at the most recently indexed version.
pub const LATEST_ALIAS: &str = "latest";
/// Alias pointing at the version served to users.
pub const LIVE_ALIAS: &str = "live";

/// Field → accepted values. A document passes when, for every field, its
/// value (or one of its array elements) equals one of the accepted values.
pub type SearchFilters = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexType {
    Content,
    Metadata,
    Unit,
    PublishedUnit,
    ContentError,
}

impl IndexType {
    pub const ALL: [IndexType; 5] = [
        IndexType::Content,
        IndexType::Metadata,
        IndexType::Unit,
        IndexType::PublishedUnit,
        IndexType::ContentError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Content => "content",
            IndexType::Metadata => "metadata",
            IndexType::Unit => "unit",
            IndexType::PublishedUnit => "publishedUnit",
            IndexType::ContentError => "contentError",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsWrapper<T> {
    pub results: Vec<T>,
    pub total_results: usize,
}

impl<T> ResultsWrapper<T> {
    pub fn new(results: Vec<T>, total_results: usize) -> Self {
        Self {
            results,
            total_results,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ResultsWrapper<U> {
        ResultsWrapper {
            results: self.results.into_iter().map(f).collect(),
            total_results: self.total_results,
        }
    }
}

/// A document queued for bulk indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub body: Value,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// An existing index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexName {
    pub version: String,
    pub index_type: IndexType,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Whether the `(version, index_type)` index exists.
    async fn has_index(&self, version: &str, index_type: IndexType) -> SearchResult<bool>;

    /// Adds or replaces one document, creating the index if needed.
    async fn index_object(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
        document: &Value,
    ) -> SearchResult<()>;

    /// Adds or replaces many documents in one operation, creating the index
    /// even when `documents` is empty.
    async fn bulk_index(
        &self,
        version: &str,
        index_type: IndexType,
        documents: &[IndexDocument],
    ) -> SearchResult<()>;

    async fn get_by_id(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
    ) -> SearchResult<Option<Value>>;

    /// Fuzzy full-text search ranked by [`ranking::rank`].
    async fn fuzzy_search(
        &self,
        version: &str,
        index_type: IndexType,
        query: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> SearchResult<ResultsWrapper<Value>>;

    /// Documents whose `field` starts with `prefix`.
    #[allow(clippy::too_many_arguments)]
    async fn find_by_prefix(
        &self,
        version: &str,
        index_type: IndexType,
        field: &str,
        prefix: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> SearchResult<ResultsWrapper<Value>>;

    async fn list_indices(&self) -> SearchResult<Vec<IndexName>>;

    /// Removes every index of `version`, and any alias pointing at it.
    async fn expunge_index(&self, version: &str) -> SearchResult<()>;

    async fn add_or_move_alias(&self, alias: &str, version: &str) -> SearchResult<()>;

    async fn resolve_alias(&self, alias: &str) -> SearchResult<Option<String>>;

    /// A version is indexed once its content index exists.
    async fn is_version_indexed(&self, version: &str) -> SearchResult<bool> {
        self.has_index(version, IndexType::Content).await
    }

    /// Versions with a content index, sorted.
    async fn indexed_versions(&self) -> SearchResult<Vec<String>> {
        let mut versions: Vec<String> = self
            .list_indices()
            .await?
            .into_iter()
            .filter(|i| i.index_type == IndexType::Content)
            .map(|i| i.version)
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }
}
