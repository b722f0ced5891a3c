//! Backend-independent ranking.
//!
//! # Scoring
//!
//! 1. Split the query on whitespace and lowercase each term.
//! 2. Tokenize high-priority fields (`id`, `title`, `tags`) and body text
//!    (`value`, `searchableContent`, and the `title`/`value` of every nested
//!    child) on non-alphanumeric boundaries.
//! 3. For each term, add [`HIGH_PRIORITY_WEIGHT`] if any high-priority token
//!    matches and [`TEXT_WEIGHT`] if any body token matches.
//! 4. Drop documents scoring zero; sort by score (desc) then id (asc).
//!
//! A term matches a token exactly, as a prefix, or within the edit distance
//! given by [`allowed_edits`]. An empty query matches every filtered
//! document, sorted by title then id.

use std::cmp::Ordering;

use serde_json::Value;

use super::{ResultsWrapper, SearchFilters};

pub const HIGH_PRIORITY_FIELDS: &[&str] = &["id", "title", "tags"];
pub const HIGH_PRIORITY_WEIGHT: f64 = 2.0;
pub const TEXT_WEIGHT: f64 = 1.0;

/// Edits tolerated for a term of `len` characters.
pub fn allowed_edits(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub fn term_matches(term: &str, token: &str) -> bool {
    if token.starts_with(term) {
        return true;
    }
    let edits = allowed_edits(term.chars().count());
    edits > 0 && edit_distance(term, token) <= edits
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                if let Value::String(s) = item {
                    out.push(s.clone());
                }
            }
        }
        _ => {}
    }
}

fn high_priority_tokens(doc: &Value) -> Vec<String> {
    let mut text = Vec::new();
    for field in HIGH_PRIORITY_FIELDS {
        if let Some(v) = doc.get(*field) {
            collect_strings(v, &mut text);
        }
    }
    text.iter().flat_map(|t| tokenize(t)).collect()
}

fn body_tokens(doc: &Value) -> Vec<String> {
    let mut text = Vec::new();
    for field in ["value", "searchableContent"] {
        if let Some(v) = doc.get(field) {
            collect_strings(v, &mut text);
        }
    }
    let mut stack: Vec<&Value> = doc
        .get("children")
        .and_then(Value::as_array)
        .map(|c| c.iter().collect())
        .unwrap_or_default();
    while let Some(child) = stack.pop() {
        for field in ["title", "value"] {
            if let Some(v) = child.get(field) {
                collect_strings(v, &mut text);
            }
        }
        if let Some(grandchildren) = child.get("children").and_then(Value::as_array) {
            stack.extend(grandchildren.iter());
        }
    }
    text.iter().flat_map(|t| tokenize(t)).collect()
}

/// Every token [`score`] can match in `doc`, high-priority fields first.
pub fn searchable_tokens(doc: &Value) -> Vec<String> {
    let mut tokens = high_priority_tokens(doc);
    tokens.extend(body_tokens(doc));
    tokens
}

/// Lowercased whitespace-separated query terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Relevance of `doc` for already-lowercased `terms`.
pub fn score(doc: &Value, terms: &[String]) -> f64 {
    let high = high_priority_tokens(doc);
    let body = body_tokens(doc);
    terms
        .iter()
        .map(|term| {
            let mut s = 0.0;
            if high.iter().any(|t| term_matches(term, t)) {
                s += HIGH_PRIORITY_WEIGHT;
            }
            if body.iter().any(|t| term_matches(term, t)) {
                s += TEXT_WEIGHT;
            }
            s
        })
        .sum()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn matches_filters(doc: &Value, filters: &SearchFilters) -> bool {
    filters.iter().all(|(field, accepted)| {
        if accepted.is_empty() {
            return true;
        }
        let actual: Vec<String> = match doc.get(field) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            Some(v) => scalar_text(v).into_iter().collect(),
            None => Vec::new(),
        };
        actual.iter().any(|a| accepted.contains(a))
    })
}

fn text_field<'a>(doc: &'a Value, field: &str) -> &'a str {
    doc.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn page<T>(items: Vec<T>, start: usize, limit: usize) -> ResultsWrapper<T> {
    let total = items.len();
    let results = items.into_iter().skip(start).take(limit).collect();
    ResultsWrapper::new(results, total)
}

/// Ranks `documents` for `query`, then pages the result.
pub fn rank(
    documents: impl IntoIterator<Item = Value>,
    query: &str,
    filters: &SearchFilters,
    start: usize,
    limit: usize,
) -> ResultsWrapper<Value> {
    let terms = query_terms(query);
    let filtered = documents.into_iter().filter(|d| matches_filters(d, filters));

    if terms.is_empty() {
        let mut all: Vec<Value> = filtered.collect();
        all.sort_by(|a, b| {
            text_field(a, "title")
                .cmp(text_field(b, "title"))
                .then_with(|| text_field(a, "id").cmp(text_field(b, "id")))
        });
        return page(all, start, limit);
    }

    let mut scored: Vec<(f64, Value)> = filtered
        .map(|d| (score(&d, &terms), d))
        .filter(|(s, _)| *s > 0.0)
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| text_field(a, "id").cmp(text_field(b, "id")))
    });
    page(scored.into_iter().map(|(_, d)| d).collect(), start, limit)
}

/// Documents whose `field` (or one of its array elements) starts with
/// `prefix`, sorted by id.
pub fn prefix_match(
    documents: impl IntoIterator<Item = Value>,
    field: &str,
    prefix: &str,
    filters: &SearchFilters,
    start: usize,
    limit: usize,
) -> ResultsWrapper<Value> {
    let mut matched: Vec<Value> = documents
        .into_iter()
        .filter(|d| matches_filters(d, filters))
        .filter(|d| {
            let mut values = Vec::new();
            if let Some(v) = d.get(field) {
                collect_strings(v, &mut values);
            }
            values.iter().any(|v| v.starts_with(prefix))
        })
        .collect();
    matched.sort_by(|a, b| text_field(a, "id").cmp(text_field(b, "id")));
    page(matched, start, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(results: &ResultsWrapper<Value>) -> Vec<&str> {
        results
            .results
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_term_matching() {
        assert!(term_matches("grav", "gravity"));
        assert!(term_matches("forse", "force"));
        assert!(!term_matches("ab", "ac"));
        assert!(term_matches("momentun", "momentum"));
        assert!(!term_matches("energy", "entropy"));
    }

    #[test]
    fn test_searchable_tokens() {
        let doc = json!({
            "id": "gravity|intro", "title": "Gravity", "tags": ["Physics"],
            "children": [{"value": "Apples fall"}]
        });
        assert_eq!(
            searchable_tokens(&doc),
            vec!["gravity", "intro", "gravity", "physics", "apples", "fall"]
        );
        assert_eq!(query_terms("  Falling  APPLES "), vec!["falling", "apples"]);
    }

    #[test]
    fn test_title_outranks_body() {
        let docs = vec![
            json!({"id": "b", "title": "Kinematics", "value": "A note on gravity"}),
            json!({"id": "a", "title": "Gravity", "value": "Falling bodies"}),
            json!({"id": "c", "title": "Optics", "value": "Light"}),
        ];
        let results = rank(docs, "gravity", &SearchFilters::new(), 0, 10);
        assert_eq!(results.total_results, 2);
        assert_eq!(ids(&results), vec!["a", "b"]);
    }

    #[test]
    fn test_children_text_is_searched() {
        let docs = vec![json!({
            "id": "page", "title": "Page",
            "children": [{"children": [{"value": "deeply nested electrons"}]}]
        })];
        let results = rank(docs, "electron", &SearchFilters::new(), 0, 10);
        assert_eq!(results.total_results, 1);
    }

    #[test]
    fn test_ties_break_on_id() {
        let docs = vec![
            json!({"id": "z", "title": "Waves"}),
            json!({"id": "m", "title": "Waves"}),
        ];
        let results = rank(docs, "waves", &SearchFilters::new(), 0, 10);
        assert_eq!(ids(&results), vec!["m", "z"]);
    }

    #[test]
    fn test_empty_query_sorts_by_title() {
        let docs = vec![
            json!({"id": "1", "title": "Zeta"}),
            json!({"id": "2", "title": "Alpha"}),
            json!({"id": "3"}),
        ];
        let results = rank(docs, "  ", &SearchFilters::new(), 0, 2);
        assert_eq!(results.total_results, 3);
        assert_eq!(ids(&results), vec!["3", "2"]);
    }

    #[test]
    fn test_filters() {
        let docs = vec![
            json!({"id": "a", "type": "page", "tags": ["physics", "maths"], "published": true}),
            json!({"id": "b", "type": "page", "tags": ["chemistry"]}),
            json!({"id": "c", "type": "question", "tags": ["physics"]}),
        ];
        let mut filters = SearchFilters::new();
        filters.insert("type".into(), vec!["page".into()]);
        filters.insert("tags".into(), vec!["physics".into(), "chemistry".into()]);
        let results = rank(docs.clone(), "", &filters, 0, 10);
        assert_eq!(ids(&results), vec!["a", "b"]);

        let mut published = SearchFilters::new();
        published.insert("published".into(), vec!["true".into()]);
        assert_eq!(ids(&rank(docs, "", &published, 0, 10)), vec!["a"]);
    }

    #[test]
    fn test_prefix_match() {
        let docs = vec![
            json!({"id": "gravity|intro"}),
            json!({"id": "gravity"}),
            json!({"id": "optics"}),
        ];
        let results = prefix_match(docs, "id", "gravity", &SearchFilters::new(), 0, 10);
        assert_eq!(ids(&results), vec!["gravity", "gravity|intro"]);
    }

    #[test]
    fn test_paging() {
        let docs: Vec<Value> = (0..5)
            .map(|i| json!({"id": format!("d{}", i), "title": "Same"}))
            .collect();
        let results = rank(docs, "same", &SearchFilters::new(), 3, 10);
        assert_eq!(results.total_results, 5);
        assert_eq!(ids(&results), vec!["d3", "d4"]);
    }
}
