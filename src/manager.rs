//! The content manager: the single read path for content.
//!
//! Every lookup resolves a version (explicit, then the in-process live
//! pointer, then the `live` alias, then the store head), then answers from
//! the per-version cache, the search index, or a snapshot loaded straight
//! from the version store, in that order. Search failures are logged and
//! answered from the snapshot instead.
//!
//! Versions are immutable, so nothing cached here is ever invalidated.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use segue_content_core::content::Content;
use segue_content_core::error::ContentError;
use segue_content_core::loader::VersionSnapshot;
use segue_content_core::search::ranking;
use segue_content_core::search::{
    IndexType, ResultsWrapper, SearchFilters, SearchProvider, LIVE_ALIAS,
};
use segue_content_core::transfer::{ContentDto, ContentSummary};
use segue_content_core::validate::ProblemEntry;
use segue_content_core::version::VersionInfo;

use crate::source::ContentSource;

type SnapshotCell = Arc<OnceCell<Arc<VersionSnapshot>>>;

/// Outcome of asking the search index for one object.
enum IndexLookup {
    Found(Content),
    Missing,
    NotIndexed,
}

pub struct ContentManager {
    source: ContentSource,
    search: Arc<dyn SearchProvider>,
    live_version: RwLock<Option<String>>,
    snapshots: Mutex<HashMap<String, SnapshotCell>>,
    objects: RwLock<HashMap<String, HashMap<String, Arc<Content>>>>,
}

impl ContentManager {
    pub fn new(source: ContentSource, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            source,
            search,
            live_version: RwLock::new(None),
            snapshots: Mutex::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_live_version(self, version: Option<String>) -> Self {
        self.set_live_version(version);
        self
    }

    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    pub fn live_version(&self) -> Option<String> {
        self.live_version
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_live_version(&self, version: Option<String>) {
        info!(version = ?version, "Setting in-process live version");
        *self
            .live_version
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = version;
    }

    /// Picks the version a request should read.
    pub async fn resolve_version(&self, requested: Option<&str>) -> Result<String, ContentError> {
        if let Some(version) = requested {
            return Ok(version.to_string());
        }
        if let Some(version) = self.live_version() {
            return Ok(version);
        }
        match self.search.resolve_alias(LIVE_ALIAS).await {
            Ok(Some(version)) => return Ok(version),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Unable to resolve live alias; using repository head"),
        }
        Ok(self.source.head_version().await?)
    }

    /// The snapshot of `version`, loading it at most once.
    pub async fn snapshot(&self, version: &str) -> Result<Arc<VersionSnapshot>, ContentError> {
        let cell = {
            let mut cells = self
                .snapshots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cells.entry(version.to_string()).or_default().clone()
        };
        let snapshot = cell
            .get_or_try_init(|| async {
                debug!(version, "Loading version snapshot from the store");
                self.source.load(version).await.map(Arc::new)
            })
            .await?;
        Ok(snapshot.clone())
    }

    fn cached(&self, version: &str, id: &str) -> Option<Arc<Content>> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(version)?.get(id).cloned())
    }

    fn remember(&self, version: &str, id: &str, content: Arc<Content>) {
        if let Ok(mut objects) = self.objects.write() {
            objects
                .entry(version.to_string())
                .or_default()
                .insert(id.to_string(), content);
        }
    }

    async fn is_indexed(&self, version: &str) -> bool {
        match self.search.is_version_indexed(version).await {
            Ok(indexed) => indexed,
            Err(e) => {
                warn!(version, error = %e, "Search provider unavailable; using the version store");
                false
            }
        }
    }

    async fn lookup_in_index(&self, version: &str, id: &str) -> Result<IndexLookup, ContentError> {
        if !self.search.is_version_indexed(version).await? {
            return Ok(IndexLookup::NotIndexed);
        }
        match self.search.get_by_id(version, IndexType::Content, id).await? {
            Some(doc) => Ok(IndexLookup::Found(
                self.source.mapper().deserialize_value(doc)?,
            )),
            None => Ok(IndexLookup::Missing),
        }
    }

    /// The persisted object `id` at `version`.
    pub async fn get_content_do_by_id(
        &self,
        version: &str,
        id: &str,
    ) -> Result<Arc<Content>, ContentError> {
        if let Some(hit) = self.cached(version, id) {
            return Ok(hit);
        }

        let found = match self.lookup_in_index(version, id).await {
            Ok(IndexLookup::Found(content)) => Some(content),
            Ok(IndexLookup::Missing) => None,
            Ok(IndexLookup::NotIndexed) => self.snapshot(version).await?.get(id).cloned(),
            Err(e) => {
                warn!(version, id, error = %e, "Search lookup failed; using the version store");
                self.snapshot(version).await?.get(id).cloned()
            }
        };

        let content = Arc::new(found.ok_or_else(|| ContentError::NotFound {
            version: version.to_string(),
            id: id.to_string(),
        })?);
        self.remember(version, id, content.clone());
        Ok(content)
    }

    /// The transfer object for `id`, with related content summaries filled in.
    pub async fn get_content_by_id(
        &self,
        version: Option<&str>,
        id: &str,
    ) -> Result<ContentDto, ContentError> {
        let version = self.resolve_version(version).await?;
        let content = self.get_content_do_by_id(&version, id).await?;
        let mut dto = self.source.mapper().to_transfer(&content)?;
        self.populate_related_content(&version, &mut dto).await;
        Ok(dto)
    }

    /// Replaces unresolved related-content ids with summaries. Ids that
    /// cannot be found stay as bare references.
    pub async fn populate_related_content(&self, version: &str, dto: &mut ContentDto) {
        for related in &mut dto.related_content {
            match self.get_content_do_by_id(version, &related.id).await {
                Ok(content) => *related = summarize(&content, &related.id),
                Err(e) => {
                    debug!(version, id = %related.id, error = %e, "Related content unresolved")
                }
            }
        }
    }

    fn to_transfer_page(&self, page: ResultsWrapper<Value>) -> ResultsWrapper<ContentDto> {
        let mapper = self.source.mapper();
        let total = page.total_results;
        let results = mapper
            .map_documents(page.results)
            .iter()
            .filter_map(|content| match mapper.to_transfer(content) {
                Ok(dto) => Some(dto),
                Err(e) => {
                    warn!(
                        id = ?content.id(),
                        error = %e,
                        "Dropping search result without transfer mapping"
                    );
                    None
                }
            })
            .collect();
        ResultsWrapper::new(results, total)
    }

    fn snapshot_documents(snapshot: &VersionSnapshot) -> Vec<Value> {
        snapshot
            .contents
            .values()
            .filter_map(|content| content.to_document().ok())
            .collect()
    }

    /// Fuzzy search over the content index.
    pub async fn search_for_content(
        &self,
        version: Option<&str>,
        query: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> Result<ResultsWrapper<ContentDto>, ContentError> {
        let version = self.resolve_version(version).await?;

        if self.is_indexed(&version).await {
            match self
                .search
                .fuzzy_search(&version, IndexType::Content, query, filters, start, limit)
                .await
            {
                Ok(page) => return Ok(self.to_transfer_page(page)),
                Err(e) => {
                    warn!(version = %version, error = %e, "Search failed; using the version store")
                }
            }
        }

        let snapshot = self.snapshot(&version).await?;
        let page = ranking::rank(Self::snapshot_documents(&snapshot), query, filters, start, limit);
        Ok(self.to_transfer_page(page))
    }

    /// Objects whose id starts with `prefix`.
    pub async fn get_by_id_prefix(
        &self,
        version: Option<&str>,
        prefix: &str,
        start: usize,
        limit: usize,
    ) -> Result<ResultsWrapper<ContentDto>, ContentError> {
        let version = self.resolve_version(version).await?;
        let filters = SearchFilters::new();

        if self.is_indexed(&version).await {
            match self
                .search
                .find_by_prefix(&version, IndexType::Content, "id", prefix, &filters, start, limit)
                .await
            {
                Ok(page) => return Ok(self.to_transfer_page(page)),
                Err(e) => {
                    warn!(
                        version = %version,
                        error = %e,
                        "Prefix search failed; using the version store"
                    )
                }
            }
        }

        let snapshot = self.snapshot(&version).await?;
        let page = ranking::prefix_match(
            Self::snapshot_documents(&snapshot),
            "id",
            prefix,
            &filters,
            start,
            limit,
        );
        Ok(self.to_transfer_page(page))
    }

    /// Every tag used at the version.
    pub async fn get_tags(&self, version: Option<&str>) -> Result<BTreeSet<String>, ContentError> {
        let version = self.resolve_version(version).await?;
        if self.is_indexed(&version).await {
            match self.search.get_by_id(&version, IndexType::Metadata, "tags").await {
                Ok(Some(doc)) => {
                    return Ok(doc
                        .get("tags")
                        .and_then(Value::as_array)
                        .map(|tags| {
                            tags.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default())
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        version = %version,
                        error = %e,
                        "Tag lookup failed; using the version store"
                    )
                }
            }
        }
        Ok(self.snapshot(&version).await?.tags.clone())
    }

    /// Units used by numeric questions, keyed by their clean form.
    pub async fn get_units(
        &self,
        version: Option<&str>,
        published_only: bool,
    ) -> Result<BTreeMap<String, String>, ContentError> {
        let version = self.resolve_version(version).await?;
        let index_type = if published_only {
            IndexType::PublishedUnit
        } else {
            IndexType::Unit
        };

        if self.is_indexed(&version).await {
            match self
                .search
                .fuzzy_search(&version, index_type, "", &SearchFilters::new(), 0, usize::MAX)
                .await
            {
                Ok(page) => {
                    return Ok(page
                        .results
                        .iter()
                        .filter_map(|doc| {
                            let key = doc.get("cleanKey")?.as_str()?;
                            let unit = doc.get("unit")?.as_str()?;
                            Some((key.to_string(), unit.to_string()))
                        })
                        .collect())
                }
                Err(e) => {
                    warn!(
                        version = %version,
                        error = %e,
                        "Unit lookup failed; using the version store"
                    )
                }
            }
        }

        let snapshot = self.snapshot(&version).await?;
        Ok(if published_only {
            snapshot.published_units.clone()
        } else {
            snapshot.units.clone()
        })
    }

    /// Content problems found when the version was indexed.
    pub async fn get_problems(
        &self,
        version: Option<&str>,
    ) -> Result<Vec<ProblemEntry>, ContentError> {
        let version = self.resolve_version(version).await?;

        if self.is_indexed(&version).await {
            match self
                .search
                .fuzzy_search(
                    &version,
                    IndexType::ContentError,
                    "",
                    &SearchFilters::new(),
                    0,
                    usize::MAX,
                )
                .await
            {
                Ok(page) => {
                    let mut entries: Vec<ProblemEntry> = page
                        .results
                        .into_iter()
                        .filter_map(|doc| serde_json::from_value(doc).ok())
                        .collect();
                    entries.sort_by(|a, b| {
                        a.canonical_source_file
                            .cmp(&b.canonical_source_file)
                            .then_with(|| a.id.cmp(&b.id))
                    });
                    return Ok(entries);
                }
                Err(e) => {
                    warn!(
                        version = %version,
                        error = %e,
                        "Problem lookup failed; using the version store"
                    )
                }
            }
        }

        Ok(self
            .snapshot(&version)
            .await?
            .problems
            .entries()
            .cloned()
            .collect())
    }

    /// Raw bytes of a file (e.g. a figure) at the version.
    pub async fn get_file_bytes(
        &self,
        version: Option<&str>,
        path: &str,
    ) -> Result<Vec<u8>, ContentError> {
        let version = self.resolve_version(version).await?;
        self.source
            .resolve_object(&version, path)
            .await?
            .ok_or_else(|| ContentError::NotFound {
                version,
                id: path.to_string(),
            })
    }

    pub async fn list_versions(&self) -> Result<Vec<VersionInfo>, ContentError> {
        Ok(self.source.list_versions().await?)
    }

    pub async fn list_indexed_versions(&self) -> Result<Vec<String>, ContentError> {
        Ok(self.search.indexed_versions().await?)
    }
}

fn summarize(content: &Content, id: &str) -> ContentSummary {
    ContentSummary {
        id: content.id().unwrap_or(id).to_string(),
        title: content.fields.title.clone(),
        content_type: Some(content.content_type().to_string()),
        summary: content.fields.subtitle.clone(),
        tags: content.fields.tags.clone(),
    }
}
