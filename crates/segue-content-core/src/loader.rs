//! Loads one version of the content tree into a flat, validated snapshot.
//!
//! This is the shared front half of indexing: the indexer pushes a snapshot
//! into the search provider, and the content manager falls back to a
//! snapshot when the search provider cannot answer.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::content::{Content, ContentKind};
use crate::error::{StoreError, StoreResult};
use crate::mapper::ContentMapper;
use crate::tree::{augment, flatten};
use crate::validate::{
    check_related_content, check_tree, is_valid_id, ProblemKind, ProblemReport,
};
use crate::version::VersionStore;

/// Extension of content files inside a version.
pub const CONTENT_SUFFIX: &str = ".json";

fn accept_all(_: &str) -> bool {
    true
}

pub struct LoadOptions<'a> {
    /// Keep objects not marked `published`.
    pub include_unpublished: bool,
    /// Filter applied to every candidate content file path.
    pub accept_path: &'a (dyn Fn(&str) -> bool + Send + Sync),
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        Self {
            include_unpublished: true,
            accept_path: &accept_all,
        }
    }
}

/// Flat view of every addressable object in one version.
#[derive(Debug, Clone, Default)]
pub struct VersionSnapshot {
    pub version: String,
    /// Every flattened object with an id, keyed by id.
    pub contents: BTreeMap<String, Content>,
    pub tags: BTreeSet<String>,
    /// Units used by numeric questions, keyed by their whitespace-free form.
    pub units: BTreeMap<String, String>,
    /// Units used by published numeric questions only.
    pub published_units: BTreeMap<String, String>,
    pub problems: ProblemReport,
}

impl VersionSnapshot {
    pub fn get(&self, id: &str) -> Option<&Content> {
        self.contents.get(id)
    }
}

/// Reads, deserializes, augments, flattens and validates every content file
/// at `version`.
///
/// Store failures abort the load. Problems with individual files or objects
/// are recorded in the snapshot's report and the load carries on.
pub fn load_version(
    store: &dyn VersionStore,
    mapper: &ContentMapper,
    version: &str,
    options: &LoadOptions<'_>,
) -> StoreResult<VersionSnapshot> {
    if !store.verify_version_exists(version) {
        return Err(StoreError::UnknownVersion(version.to_string()));
    }

    let mut snapshot = VersionSnapshot {
        version: version.to_string(),
        ..VersionSnapshot::default()
    };
    let object_exists = |path: &str| store.object_exists(version, path);

    let paths = store.list_objects(version, CONTENT_SUFFIX)?;
    let mut files = 0usize;
    for path in paths.iter().filter(|p| (options.accept_path)(p.as_str())) {
        let Some(bytes) = store.read_object(version, path)? else {
            warn!(version, path = %path, "Listed object vanished while loading");
            continue;
        };
        files += 1;

        let mut root = match mapper.deserialize(version, &bytes) {
            Ok(content) => content,
            Err(e) => {
                warn!(version, path = %path, error = %e, "Unable to deserialize content file");
                snapshot.problems.record_file(
                    path,
                    ProblemKind::Mapping,
                    format!("Index failure - Unable to parse json file found - {}: {}", path, e),
                );
                continue;
            }
        };

        if !options.include_unpublished && !root.is_published() {
            debug!(version, path = %path, "Skipping unpublished content");
            continue;
        }

        augment(&mut root, path);
        check_tree(&root, &object_exists, &mut snapshot.problems)?;
        collect_units(&root, &mut snapshot);

        for node in flatten(&root) {
            let Some(id) = node.id() else { continue };
            snapshot.tags.extend(node.fields.tags.iter().cloned());

            if !is_valid_id(id) {
                snapshot.problems.record(
                    node,
                    ProblemKind::InvalidId,
                    format!(
                        "Index failure - Invalid ID {} found in file {}. Must not contain restricted characters.",
                        id, path
                    ),
                );
                continue;
            }

            match snapshot.contents.get(id) {
                Some(existing) if existing.same_content(node) => {}
                Some(existing) => {
                    let first = existing
                        .fields
                        .canonical_source_file
                        .clone()
                        .unwrap_or_default();
                    snapshot.problems.record(
                        node,
                        ProblemKind::DuplicateId,
                        format!(
                            "Index failure - Duplicate ID {} found in files {} and {}; keeping the one in {}.",
                            id, first, path, first
                        ),
                    );
                }
                None => {
                    snapshot.contents.insert(id.to_string(), node.clone());
                }
            }
        }
    }

    check_related_content(&snapshot.contents, &mut snapshot.problems);

    info!(
        version,
        files,
        objects = snapshot.contents.len(),
        tags = snapshot.tags.len(),
        problems = snapshot.problems.problem_count(),
        "Loaded content version"
    );
    Ok(snapshot)
}

/// Whitespace-free key used to deduplicate unit spellings.
pub fn clean_unit_key(unit: &str) -> String {
    unit.chars().filter(|c| !c.is_whitespace()).collect()
}

fn collect_units(root: &Content, snapshot: &mut VersionSnapshot) {
    let published = root.is_published();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        stack.extend(node.nested());
        let ContentKind::Question(question) = &node.kind else {
            continue;
        };
        if node.class_name != "IsaacNumericQuestion" {
            continue;
        }
        for choice in &question.choices {
            let ContentKind::Choice(details) = &choice.kind else {
                continue;
            };
            let Some(units) = details.attributes.units.as_deref() else {
                continue;
            };
            if choice.class_name != "Quantity" || units.trim().is_empty() {
                continue;
            }
            let key = clean_unit_key(units);
            snapshot.units.insert(key.clone(), units.to_string());
            if published {
                snapshot.published_units.insert(key, units.to_string());
            }
        }
    }
}
