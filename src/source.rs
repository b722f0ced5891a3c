//! Async access to the version store and snapshot loader.
//!
//! [`VersionStore`] is synchronous and the git backend blocks on child
//! processes, so every call made from async code is moved onto tokio's
//! blocking pool here.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use segue_content_core::error::{StoreError, StoreResult};
use segue_content_core::loader::{load_version, LoadOptions, VersionSnapshot};
use segue_content_core::mapper::ContentMapper;
use segue_content_core::version::{VersionInfo, VersionStore};

use crate::config::{Config, PathFilter};

/// Version store, mapper and load settings shared by the indexer and the
/// content manager.
#[derive(Clone)]
pub struct ContentSource {
    store: Arc<dyn VersionStore>,
    mapper: Arc<ContentMapper>,
    include_unpublished: bool,
    filter: Option<Arc<PathFilter>>,
}

impl ContentSource {
    /// Loads every `.json` object, published or not.
    pub fn new(store: Arc<dyn VersionStore>, mapper: Arc<ContentMapper>) -> Self {
        Self {
            store,
            mapper,
            include_unpublished: true,
            filter: None,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn VersionStore>,
        mapper: Arc<ContentMapper>,
    ) -> Result<Self> {
        Ok(Self::new(store, mapper)
            .with_include_unpublished(config.content.include_unpublished)
            .with_filter(config.content.path_filter()?))
    }

    pub fn with_include_unpublished(mut self, include: bool) -> Self {
        self.include_unpublished = include;
        self
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn mapper(&self) -> &Arc<ContentMapper> {
        &self.mapper
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn VersionStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| StoreError::Access(format!("version store task failed: {}", e)))?
    }

    /// Loads, validates and flattens `version`.
    pub async fn load(&self, version: &str) -> StoreResult<VersionSnapshot> {
        let store = self.store.clone();
        let mapper = self.mapper.clone();
        let filter = self.filter.clone();
        let include_unpublished = self.include_unpublished;
        let version = version.to_string();

        tokio::task::spawn_blocking(move || {
            let accept = move |path: &str| filter.as_ref().map_or(true, |f| f.accepts(path));
            let options = LoadOptions {
                include_unpublished,
                accept_path: &accept,
            };
            load_version(store.as_ref(), &mapper, &version, &options)
        })
        .await
        .map_err(|e| StoreError::Access(format!("content load task failed: {}", e)))?
    }

    pub async fn verify_version_exists(&self, version: &str) -> bool {
        let version = version.to_string();
        self.blocking(move |store| Ok(store.verify_version_exists(&version)))
            .await
            .unwrap_or(false)
    }

    pub async fn head_version(&self) -> StoreResult<String> {
        self.blocking(|store| store.head_version()).await
    }

    pub async fn list_versions(&self) -> StoreResult<Vec<VersionInfo>> {
        self.blocking(|store| store.list_versions()).await
    }

    pub async fn version_time(&self, version: &str) -> StoreResult<DateTime<Utc>> {
        let version = version.to_string();
        self.blocking(move |store| store.version_time(&version)).await
    }

    pub async fn resolve_object(&self, version: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let version = version.to_string();
        let path = path.to_string();
        self.blocking(move |store| store.resolve_object(&version, &path))
            .await
    }
}
