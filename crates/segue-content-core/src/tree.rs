//! Content tree traversal: flattening and load-time augmentation.
//!
//! Both walks use an explicit stack. Flattening tracks visited ids so a
//! repeated id, including one reached again beneath itself, is emitted and
//! descended into once.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

use crate::content::{Content, ContentKind, ID_SEPARATOR};

/// Every node of the tree rooted at `root`, parents before children.
///
/// Only inline `children` are followed; question parts stay attached to the
/// question that owns them.
pub fn flatten(root: &Content) -> Vec<&Content> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if let Some(id) = node.id() {
            if !seen.insert(id) {
                continue;
            }
        }
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Prepares a freshly deserialized tree for indexing.
///
/// Every node gets `source_file` as its canonical source file, ids of nested
/// nodes are qualified with their parent's id, relative media sources are
/// resolved against the source file's directory, and media without an id
/// get one derived from their source.
pub fn augment(root: &mut Content, source_file: &str) {
    let mut stack: Vec<(&mut Content, Option<String>)> = vec![(root, None)];

    while let Some((node, parent_id)) = stack.pop() {
        node.fields.canonical_source_file = Some(source_file.to_string());

        if let ContentKind::Media(media) = &mut node.kind {
            if let Some(src) = media.src.as_deref() {
                if !is_remote(src) {
                    media.src = Some(resolve_relative(source_file, src));
                }
            }
            if node.fields.id.is_none() {
                if let Some(src) = media.src.as_deref() {
                    let encoded = STANDARD.encode(src.as_bytes());
                    node.fields.id = Some(match &parent_id {
                        Some(parent) => format!("{}{}{}", parent, ID_SEPARATOR, encoded),
                        None => encoded,
                    });
                }
            }
        } else if node.is_question() && node.fields.id.is_none() {
            warn!(source_file, "Found question without id");
        }

        let own_id = match (&parent_id, node.fields.id.take()) {
            (Some(parent), Some(id)) if !id.starts_with(&format!("{}{}", parent, ID_SEPARATOR)) => {
                Some(format!("{}{}{}", parent, ID_SEPARATOR, id))
            }
            (_, id) => id,
        };
        node.fields.id = own_id.clone();

        let child_parent = own_id.or(parent_id);
        for child in node.nested_mut() {
            stack.push((child, child_parent.clone()));
        }
    }
}

fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Joins `relative` onto the directory of `source_file` and normalizes
/// `.` and `..` segments.
pub fn resolve_relative(source_file: &str, relative: &str) -> String {
    let base_dir = match source_file.rfind('/') {
        Some(pos) => &source_file[..pos],
        None => "",
    };
    let joined = if relative.starts_with('/') || base_dir.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", base_dir, relative)
    };
    normalize_path(&joined)
}

pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}
