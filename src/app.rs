//! Wires configuration into the running services.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use segue_content_core::mapper::ContentMapper;
use segue_content_core::search::{InMemorySearchProvider, SearchProvider};
use segue_content_core::version::{CachingVersionStore, VersionStore};

use crate::config::Config;
use crate::git_store::GitVersionStore;
use crate::indexer::ContentIndexer;
use crate::manager::ContentManager;
use crate::source::ContentSource;
use crate::sqlite_search::SqliteSearchProvider;
use crate::{db, migrate};

/// Everything a command or the HTTP server needs.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub source: ContentSource,
    pub search: Arc<dyn SearchProvider>,
    pub indexer: Arc<ContentIndexer>,
    pub manager: Arc<ContentManager>,
}

impl Services {
    /// Assembles services around an existing store and search provider.
    pub fn assemble(
        config: &Config,
        store: Arc<dyn VersionStore>,
        search: Arc<dyn SearchProvider>,
    ) -> Result<Self> {
        let mapper = Arc::new(ContentMapper::with_defaults());
        let source = ContentSource::from_config(config, store, mapper)?;
        let indexer = Arc::new(ContentIndexer::new(source.clone(), search.clone()));
        let manager = Arc::new(
            ContentManager::new(source.clone(), search.clone())
                .with_live_version(config.content.initial_live_version.clone()),
        );
        Ok(Self {
            config: Arc::new(config.clone()),
            source,
            search,
            indexer,
            manager,
        })
    }
}

/// Opens the configured search backend, creating its schema if needed.
pub async fn open_search(config: &Config) -> Result<Arc<dyn SearchProvider>> {
    match config.search.backend.as_str() {
        "sqlite" => {
            let pool = db::connect(config).await?;
            migrate::apply(&pool).await?;
            Ok(Arc::new(SqliteSearchProvider::new(pool)))
        }
        "memory" => Ok(Arc::new(InMemorySearchProvider::new())),
        other => bail!("unknown search backend: {}", other),
    }
}

/// Opens the git repository (cloning or fetching when a URL is configured)
/// and memoizes reads on top of it.
pub async fn open_store(config: &Config) -> Result<Arc<dyn VersionStore>> {
    let config = config.clone();
    let git = tokio::task::spawn_blocking(move || GitVersionStore::from_config(&config)).await??;
    info!(repo = %git.repo_dir().display(), "Opened content repository");
    Ok(Arc::new(CachingVersionStore::new(git)))
}

pub async fn build_services(config: &Config) -> Result<Services> {
    let store = open_store(config).await?;
    let search = open_search(config).await?;
    Services::assemble(config, store, search)
}
