//! In-memory [`SearchProvider`] for testing and embedding.
//!
//! Uses `HashMap` and `BTreeMap` behind `std::sync::RwLock`. Searches scan
//! every document of the index and rank with [`ranking`](super::ranking).

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::ranking;
use super::{IndexDocument, IndexName, IndexType, ResultsWrapper, SearchFilters, SearchProvider};
use crate::error::{SearchError, SearchResult};

type Index = BTreeMap<String, Value>;

#[derive(Default)]
pub struct InMemorySearchProvider {
    indices: RwLock<HashMap<(String, IndexType), Index>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl InMemorySearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_indices(
        &self,
    ) -> SearchResult<RwLockReadGuard<'_, HashMap<(String, IndexType), Index>>> {
        self.indices.read().map_err(|_| poisoned())
    }

    fn write_indices(
        &self,
    ) -> SearchResult<RwLockWriteGuard<'_, HashMap<(String, IndexType), Index>>> {
        self.indices.write().map_err(|_| poisoned())
    }

    fn documents(&self, version: &str, index_type: IndexType) -> SearchResult<Vec<Value>> {
        Ok(self
            .read_indices()?
            .get(&(version.to_string(), index_type))
            .map(|index| index.values().cloned().collect())
            .unwrap_or_default())
    }
}

fn poisoned() -> SearchError {
    SearchError::Backend("in-memory index lock poisoned".to_string())
}

#[async_trait]
impl SearchProvider for InMemorySearchProvider {
    async fn has_index(&self, version: &str, index_type: IndexType) -> SearchResult<bool> {
        Ok(self
            .read_indices()?
            .contains_key(&(version.to_string(), index_type)))
    }

    async fn index_object(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
        document: &Value,
    ) -> SearchResult<()> {
        self.write_indices()?
            .entry((version.to_string(), index_type))
            .or_default()
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn bulk_index(
        &self,
        version: &str,
        index_type: IndexType,
        documents: &[IndexDocument],
    ) -> SearchResult<()> {
        let mut indices = self.write_indices()?;
        let index = indices.entry((version.to_string(), index_type)).or_default();
        for doc in documents {
            index.insert(doc.id.clone(), doc.body.clone());
        }
        Ok(())
    }

    async fn get_by_id(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
    ) -> SearchResult<Option<Value>> {
        Ok(self
            .read_indices()?
            .get(&(version.to_string(), index_type))
            .and_then(|index| index.get(id).cloned()))
    }

    async fn fuzzy_search(
        &self,
        version: &str,
        index_type: IndexType,
        query: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> SearchResult<ResultsWrapper<Value>> {
        let docs = self.documents(version, index_type)?;
        Ok(ranking::rank(docs, query, filters, start, limit))
    }

    async fn find_by_prefix(
        &self,
        version: &str,
        index_type: IndexType,
        field: &str,
        prefix: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> SearchResult<ResultsWrapper<Value>> {
        let docs = self.documents(version, index_type)?;
        Ok(ranking::prefix_match(docs, field, prefix, filters, start, limit))
    }

    async fn list_indices(&self) -> SearchResult<Vec<IndexName>> {
        let mut names: Vec<IndexName> = self
            .read_indices()?
            .keys()
            .map(|(version, index_type)| IndexName {
                version: version.clone(),
                index_type: *index_type,
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn expunge_index(&self, version: &str) -> SearchResult<()> {
        self.write_indices()?.retain(|(v, _), _| v != version);
        self.aliases
            .write()
            .map_err(|_| poisoned())?
            .retain(|_, target| target != version);
        Ok(())
    }

    async fn add_or_move_alias(&self, alias: &str, version: &str) -> SearchResult<()> {
        self.aliases
            .write()
            .map_err(|_| poisoned())?
            .insert(alias.to_string(), version.to_string());
        Ok(())
    }

    async fn resolve_alias(&self, alias: &str) -> SearchResult<Option<String>> {
        Ok(self
            .aliases
            .read()
            .map_err(|_| poisoned())?
            .get(alias)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bulk_index_creates_empty_index() {
        let provider = InMemorySearchProvider::new();
        assert!(!provider.has_index("v1", IndexType::Content).await.unwrap());
        provider.bulk_index("v1", IndexType::Content, &[]).await.unwrap();
        assert!(provider.is_version_indexed("v1").await.unwrap());
        assert_eq!(provider.indexed_versions().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let provider = InMemorySearchProvider::new();
        provider
            .bulk_index(
                "v1",
                IndexType::Content,
                &[
                    IndexDocument::new("a", json!({"id": "a", "title": "Gravity"})),
                    IndexDocument::new("b", json!({"id": "b", "title": "Optics"})),
                ],
            )
            .await
            .unwrap();
        let results = provider
            .fuzzy_search("v1", IndexType::Content, "gravty", &SearchFilters::new(), 0, 10)
            .await
            .unwrap();
        assert_eq!(results.total_results, 1);
        assert_eq!(
            provider
                .get_by_id("v1", IndexType::Content, "b")
                .await
                .unwrap()
                .unwrap()["title"],
            "Optics"
        );
        // Other versions are isolated.
        assert!(provider
            .get_by_id("v2", IndexType::Content, "a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_aliases_and_expunge() {
        let provider = InMemorySearchProvider::new();
        provider
            .index_object("v1", IndexType::Metadata, "general", &json!({"version": "v1"}))
            .await
            .unwrap();
        provider.add_or_move_alias("live", "v1").await.unwrap();
        assert_eq!(
            provider.resolve_alias("live").await.unwrap().as_deref(),
            Some("v1")
        );
        provider.add_or_move_alias("live", "v2").await.unwrap();
        assert_eq!(
            provider.resolve_alias("live").await.unwrap().as_deref(),
            Some("v2")
        );

        provider.add_or_move_alias("latest", "v1").await.unwrap();
        provider.expunge_index("v1").await.unwrap();
        assert!(provider.list_indices().await.unwrap().is_empty());
        assert_eq!(provider.resolve_alias("latest").await.unwrap(), None);
        assert!(provider.resolve_alias("live").await.unwrap().is_some());
    }
}
