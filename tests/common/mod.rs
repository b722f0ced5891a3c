#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use segue_content::source::ContentSource;
use segue_content_core::error::{SearchError, SearchResult, StoreResult};
use segue_content_core::mapper::ContentMapper;
use segue_content_core::search::{
    IndexDocument, IndexName, IndexType, InMemorySearchProvider, ResultsWrapper, SearchFilters,
    SearchProvider,
};
use segue_content_core::version::{InMemoryVersionStore, VersionInfo, VersionStore};

// ============ Git fixtures ============

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.org"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?}: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
}

/// Writes `files` into the work tree and commits them, returning the sha.
pub fn commit(dir: &Path, files: &[(&str, &str)], message: &str) -> String {
    for (path, body) in files {
        let full = dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, body).unwrap();
    }
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "--allow-empty", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

// ============ Content fixtures ============

pub const GRAVITY: &str = r#"{
    "id": "gravity",
    "type": "isaacConceptPage",
    "title": "Gravity",
    "published": true,
    "tags": ["physics", "mechanics"],
    "relatedContent": ["optics"],
    "children": [
        {"id": "intro", "type": "content", "encoding": "markdown", "value": "Apples fall towards the earth"}
    ]
}"#;

pub const OPTICS: &str = r#"{
    "id": "optics",
    "type": "isaacConceptPage",
    "title": "Optics",
    "subtitle": "Light and lenses",
    "published": true,
    "tags": ["physics", "waves"],
    "children": [{"type": "content", "value": "Refraction bends light"}]
}"#;

pub const NUMERIC: &str = r#"{
    "id": "falling",
    "type": "isaacQuestionPage",
    "title": "Falling bodies",
    "published": true,
    "tags": ["mechanics"],
    "children": [{
        "id": "g",
        "type": "isaacNumericQuestion",
        "value": "What is g?",
        "choices": [
            {"type": "quantity", "value": "9.81", "units": "m s^-2", "correct": true}
        ]
    }]
}"#;

pub fn memory_store(version: &str, files: &[(&str, &str)]) -> Arc<InMemoryVersionStore> {
    let store = Arc::new(InMemoryVersionStore::new());
    store
        .commit(version, files.iter().map(|(p, b)| (*p, *b)))
        .unwrap();
    store
}

pub fn source_for(store: Arc<InMemoryVersionStore>) -> ContentSource {
    ContentSource::new(store, Arc::new(ContentMapper::with_defaults()))
}

// ============ Counting version store ============

/// Delegates to an in-memory store, counting content listings.
pub struct CountingStore {
    inner: Arc<InMemoryVersionStore>,
    pub list_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<InMemoryVersionStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn listings(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl VersionStore for CountingStore {
    fn read_object(&self, version: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.read_object(version, path)
    }

    fn list_objects(&self, version: &str, suffix: &str) -> StoreResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_objects(version, suffix)
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

// ============ Recording search provider ============

/// Delegates to an in-memory provider, counting writes and optionally
/// failing every call.
#[derive(Default)]
pub struct RecordingSearch {
    inner: InMemorySearchProvider,
    pub bulk_calls: AtomicUsize,
    pub object_calls: AtomicUsize,
    pub content_bulk_calls: AtomicUsize,
    /// Every call, reads included.
    pub calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingSearch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst) + self.object_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> SearchResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(SearchError::Backend("search cluster unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SearchProvider for RecordingSearch {
    async fn has_index(&self, version: &str, index_type: IndexType) -> SearchResult<bool> {
        self.check()?;
        self.inner.has_index(version, index_type).await
    }

    async fn index_object(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
        document: &Value,
    ) -> SearchResult<()> {
        self.check()?;
        self.object_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.index_object(version, index_type, id, document).await
    }

    async fn bulk_index(
        &self,
        version: &str,
        index_type: IndexType,
        documents: &[IndexDocument],
    ) -> SearchResult<()> {
        self.check()?;
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if index_type == IndexType::Content {
            self.content_bulk_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.bulk_index(version, index_type, documents).await
    }

    async fn get_by_id(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
    ) -> SearchResult<Option<Value>> {
        self.check()?;
        self.inner.get_by_id(version, index_type, id).await
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
        self.check()?;
        self.inner
            .fuzzy_search(version, index_type, query, filters, start, limit)
            .await
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
        self.check()?;
        self.inner
            .find_by_prefix(version, index_type, field, prefix, filters, start, limit)
            .await
    }

    async fn list_indices(&self) -> SearchResult<Vec<IndexName>> {
        self.check()?;
        self.inner.list_indices().await
    }

    async fn expunge_index(&self, version: &str) -> SearchResult<()> {
        self.check()?;
        self.inner.expunge_index(version).await
    }

    async fn add_or_move_alias(&self, alias: &str, version: &str) -> SearchResult<()> {
        self.check()?;
        self.inner.add_or_move_alias(alias, version).await
    }

    async fn resolve_alias(&self, alias: &str) -> SearchResult<Option<String>> {
        self.check()?;
        self.inner.resolve_alias(alias).await
    }
}
