mod common;

use std::sync::Arc;

use segue_content::indexer::ContentIndexer;
use segue_content::manager::ContentManager;
use segue_content::source::ContentSource;
use segue_content_core::error::ContentError;
use segue_content_core::mapper::ContentMapper;
use segue_content_core::search::{SearchFilters, SearchProvider, LIVE_ALIAS};
use segue_content_core::validate::ProblemKind;
use segue_content_core::version::InMemoryVersionStore;

use common::{
    memory_store, source_for, CountingStore, RecordingSearch, GRAVITY, NUMERIC, OPTICS,
};

struct Fixture {
    store: Arc<InMemoryVersionStore>,
    search: Arc<RecordingSearch>,
    indexer: ContentIndexer,
    manager: ContentManager,
}

fn fixture() -> Fixture {
    let store = memory_store(
        "v1",
        &[
            ("concepts/gravity.json", GRAVITY),
            ("concepts/optics.json", OPTICS),
            ("questions/falling.json", NUMERIC),
            ("figures/g.svg", "<svg/>"),
        ],
    );
    let search = RecordingSearch::new();
    let source = source_for(store.clone());
    Fixture {
        indexer: ContentIndexer::new(source.clone(), search.clone()),
        manager: ContentManager::new(source, search.clone()),
        store,
        search,
    }
}

fn ids(results: &[segue_content_core::transfer::ContentDto]) -> Vec<&str> {
    results.iter().filter_map(|d| d.id.as_deref()).collect()
}

#[tokio::test]
async fn test_get_unindexed_version_reads_the_store() {
    let f = fixture();
    let dto = f.manager.get_content_by_id(Some("v1"), "gravity").await.unwrap();

    assert_eq!(dto.title.as_deref(), Some("Gravity"));
    assert_eq!(dto.children.len(), 1);
    assert_eq!(dto.related_content.len(), 1);
    let related = &dto.related_content[0];
    assert_eq!(related.id, "optics");
    assert_eq!(related.title.as_deref(), Some("Optics"));
    assert_eq!(related.summary.as_deref(), Some("Light and lenses"));
    assert_eq!(f.search.writes(), 0);
}

#[tokio::test]
async fn test_missing_id_is_not_found() {
    let f = fixture();
    let err = f
        .manager
        .get_content_by_id(Some("v1"), "nothing-here")
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::NotFound { .. }));

    f.indexer.build_index("v1").await.unwrap();
    let err = f
        .manager
        .get_content_by_id(Some("v1"), "nothing-here")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_unknown_version_is_not_found() {
    let f = fixture();
    let err = f
        .manager
        .get_content_by_id(Some("v9"), "gravity")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_search_outage_falls_back_to_store() {
    let f = fixture();
    f.indexer.build_index("v1").await.unwrap();
    f.search.set_failing(true);

    let dto = f.manager.get_content_by_id(Some("v1"), "optics").await.unwrap();
    assert_eq!(dto.title.as_deref(), Some("Optics"));

    let page = f
        .manager
        .search_for_content(Some("v1"), "gravity", &SearchFilters::new(), 0, 10)
        .await
        .unwrap();
    assert_eq!(ids(&page.results)[0], "gravity");
}

#[tokio::test]
async fn test_indexed_and_fallback_search_agree() {
    let f = fixture();
    let mut filters = SearchFilters::new();
    filters.insert("tags".to_string(), vec!["physics".to_string()]);

    let from_store = f
        .manager
        .search_for_content(Some("v1"), "", &filters, 0, 10)
        .await
        .unwrap();

    f.indexer.build_index("v1").await.unwrap();
    let from_index = f
        .manager
        .search_for_content(Some("v1"), "", &filters, 0, 10)
        .await
        .unwrap();

    assert_eq!(ids(&from_store.results), vec!["gravity", "optics"]);
    assert_eq!(ids(&from_store.results), ids(&from_index.results));
    assert_eq!(from_store.total_results, from_index.total_results);
}

#[tokio::test]
async fn test_search_pages_results() {
    let f = fixture();
    f.indexer.build_index("v1").await.unwrap();
    let page = f
        .manager
        .search_for_content(Some("v1"), "", &SearchFilters::new(), 1, 2)
        .await
        .unwrap();
    assert_eq!(page.results.len(), 2);
    assert!(page.total_results > 2);
}

#[tokio::test]
async fn test_prefix_lookup() {
    let f = fixture();
    let page = f
        .manager
        .get_by_id_prefix(Some("v1"), "gravity", 0, 10)
        .await
        .unwrap();
    assert_eq!(ids(&page.results), vec!["gravity", "gravity|intro"]);
}

#[tokio::test]
async fn test_version_resolution_order() {
    let f = fixture();
    f.store
        .commit("v2", [("concepts/optics.json", OPTICS)])
        .unwrap();

    // Nothing live: the store head
    assert_eq!(f.manager.resolve_version(None).await.unwrap(), "v2");

    // The live alias
    f.indexer.set_live("v1").await.unwrap();
    assert_eq!(f.manager.resolve_version(None).await.unwrap(), "v1");

    // The in-process pointer beats the alias
    f.manager.set_live_version(Some("v2".to_string()));
    assert_eq!(f.manager.resolve_version(None).await.unwrap(), "v2");

    // An explicit version beats everything
    assert_eq!(f.manager.resolve_version(Some("v1")).await.unwrap(), "v1");

    f.manager.set_live_version(None);
    let dto = f.manager.get_content_by_id(None, "gravity").await.unwrap();
    assert_eq!(dto.title.as_deref(), Some("Gravity"));
}

#[tokio::test]
async fn test_alias_outage_uses_head() {
    let f = fixture();
    f.indexer.set_live("v1").await.unwrap();
    f.store.commit("v2", [("concepts/optics.json", OPTICS)]).unwrap();
    f.search.set_failing(true);

    assert_eq!(f.manager.resolve_version(None).await.unwrap(), "v2");

    f.search.set_failing(false);
    assert_eq!(
        f.search.resolve_alias(LIVE_ALIAS).await.unwrap().as_deref(),
        Some("v1")
    );
}

#[tokio::test]
async fn test_tags_units_and_problems() {
    let f = fixture();
    let tags = f.manager.get_tags(Some("v1")).await.unwrap();
    assert!(tags.contains("waves"));

    let units = f.manager.get_units(Some("v1"), true).await.unwrap();
    assert_eq!(units.get("ms^-2").map(String::as_str), Some("m s^-2"));

    f.indexer.build_index("v1").await.unwrap();
    assert_eq!(f.manager.get_tags(Some("v1")).await.unwrap(), tags);
    assert_eq!(f.manager.get_units(Some("v1"), false).await.unwrap(), units);

    let problems = f.manager.get_problems(Some("v1")).await.unwrap();
    assert!(problems
        .iter()
        .flat_map(|e| &e.problems)
        .all(|p| p.kind != ProblemKind::DuplicateId));
}

#[tokio::test]
async fn test_file_bytes() {
    let f = fixture();
    let bytes = f
        .manager
        .get_file_bytes(Some("v1"), "figures/g.svg")
        .await
        .unwrap();
    assert_eq!(bytes, b"<svg/>");

    let err = f
        .manager
        .get_file_bytes(Some("v1"), "figures/missing.svg")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_indexed_versions_listed() {
    let f = fixture();
    assert!(f.manager.list_indexed_versions().await.unwrap().is_empty());
    f.indexer.build_index("v1").await.unwrap();
    assert_eq!(f.manager.list_indexed_versions().await.unwrap(), vec!["v1"]);
    assert_eq!(f.manager.list_versions().await.unwrap().len(), 1);
    assert!(f.search.is_version_indexed("v1").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_reads_load_version_once() {
    let store = CountingStore::new(memory_store(
        "v1",
        &[
            ("concepts/gravity.json", GRAVITY),
            ("concepts/optics.json", OPTICS),
            ("questions/falling.json", NUMERIC),
        ],
    ));
    let search = RecordingSearch::new();
    let source = ContentSource::new(store.clone(), Arc::new(ContentMapper::with_defaults()));
    let manager = Arc::new(ContentManager::new(source, search.clone()));

    let handles: Vec<_> = ["gravity", "optics", "falling", "gravity|intro", "falling|g"]
        .into_iter()
        .map(|id| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_content_by_id(Some("v1"), id).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(store.listings(), 1);

    // Repeat lookups are answered from memory
    let calls = search.calls();
    let dto = manager.get_content_by_id(Some("v1"), "gravity").await.unwrap();
    assert_eq!(dto.related_content[0].title.as_deref(), Some("Optics"));
    assert_eq!(search.calls(), calls);
    assert_eq!(store.listings(), 1);
}
