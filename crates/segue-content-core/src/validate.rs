//! Content problem detection.
//!
//! Validation never aborts indexing: every problem found is recorded in a
//! [`ProblemReport`] against the content object (or source file) it concerns,
//! and the report is indexed alongside the content so authors can review it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::{Content, ContentKind};
use crate::error::StoreResult;

/// Category of a recorded content problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProblemKind {
    /// The source file could not be deserialized.
    Mapping,
    InvalidId,
    DuplicateId,
    /// A `relatedContent` reference names an id that does not exist.
    DanglingReference,
    MissingField,
    Validation,
    Serialization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProblem {
    pub kind: ProblemKind,
    pub message: String,
}

/// All problems recorded against one content object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub canonical_source_file: String,
    #[serde(default)]
    pub published: bool,
    #[serde(rename = "errors")]
    pub problems: Vec<ContentProblem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemReport {
    entries: BTreeMap<(String, Option<String>), ProblemEntry>,
}

impl ProblemReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a problem against a content object.
    pub fn record(&mut self, content: &Content, kind: ProblemKind, message: impl Into<String>) {
        let source = content
            .fields
            .canonical_source_file
            .clone()
            .unwrap_or_default();
        let title = content
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| file_name(&source).to_string());
        let entry = self
            .entries
            .entry((source.clone(), content.fields.id.clone()))
            .or_insert_with(|| ProblemEntry {
                id: content.fields.id.clone(),
                title,
                canonical_source_file: source,
                published: content.is_published(),
                problems: Vec::new(),
            });
        entry.problems.push(ContentProblem {
            kind,
            message: message.into(),
        });
    }

    /// Records a problem against a whole source file, e.g. one that did not
    /// deserialize.
    pub fn record_file(
        &mut self,
        source_file: &str,
        kind: ProblemKind,
        message: impl Into<String>,
    ) {
        let entry = self
            .entries
            .entry((source_file.to_string(), None))
            .or_insert_with(|| ProblemEntry {
                id: None,
                title: file_name(source_file).to_string(),
                canonical_source_file: source_file.to_string(),
                published: false,
                problems: Vec::new(),
            });
        entry.problems.push(ContentProblem {
            kind,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct objects or files with problems.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn problem_count(&self) -> usize {
        self.entries.values().map(|e| e.problems.len()).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProblemEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> Vec<ProblemEntry> {
        self.entries.into_values().collect()
    }

    pub fn of_kind(&self, kind: ProblemKind) -> Vec<(&ProblemEntry, &ContentProblem)> {
        self.entries
            .values()
            .flat_map(|entry| {
                entry
                    .problems
                    .iter()
                    .filter(move |p| p.kind == kind)
                    .map(move |p| (entry, p))
            })
            .collect()
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Ids may not contain `.`.
pub fn is_valid_id(id: &str) -> bool {
    !id.contains('.')
}

/// Question types answered free-form rather than by picking a choice.
const CHOICELESS_QUESTION_TYPES: &[&str] = &["question", "isaacQuestion"];

/// Runs every per-node check over the whole tree rooted at `root`,
/// including question parts. `object_exists` answers whether a media source
/// path exists in the same version; its errors abort the check.
pub fn check_tree(
    root: &Content,
    object_exists: &dyn Fn(&str) -> StoreResult<bool>,
    report: &mut ProblemReport,
) -> StoreResult<()> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        check_node(node, object_exists, report)?;
        stack.extend(node.nested());
    }
    Ok(())
}

pub fn check_node(
    node: &Content,
    object_exists: &dyn Fn(&str) -> StoreResult<bool>,
    report: &mut ProblemReport,
) -> StoreResult<()> {
    if node.fields.value.is_some() && !node.children.is_empty() {
        report.record(
            node,
            ProblemKind::Validation,
            format!(
                "Content object {} has both children and a value. Only one of these should be set.",
                describe(node)
            ),
        );
    }

    match &node.kind {
        ContentKind::Media(media) => {
            let needs_alt_text = matches!(node.content_type(), "image" | "figure");
            if needs_alt_text && media.alt_text.as_deref().map_or(true, str::is_empty) {
                report.record(
                    node,
                    ProblemKind::MissingField,
                    format!("Media {} has no alt text.", describe(node)),
                );
            }
            match media.src.as_deref() {
                None | Some("") => report.record(
                    node,
                    ProblemKind::MissingField,
                    format!("Media {} has no src.", describe(node)),
                ),
                Some(src) if src.starts_with("http://") || src.starts_with("https://") => {}
                Some(src) => {
                    if !object_exists(src)? {
                        report.record(
                            node,
                            ProblemKind::Validation,
                            format!("Unable to find media '{}' in the content store.", src),
                        );
                    }
                }
            }
        }
        ContentKind::Question(question) => {
            if node.id().is_none() {
                report.record(node, ProblemKind::MissingField, "Found question without id.");
            }
            if !CHOICELESS_QUESTION_TYPES.contains(&node.content_type()) {
                if question.choices.is_empty() {
                    report.record(
                        node,
                        ProblemKind::Validation,
                        format!("Question {} has no choices.", describe(node)),
                    );
                } else if !question.choices.iter().any(is_correct_choice) {
                    report.record(
                        node,
                        ProblemKind::Validation,
                        format!("Question {} has no correct answer.", describe(node)),
                    );
                }
            }
            for choice in &question.choices {
                check_choice(node, choice, report);
            }
        }
        ContentKind::EmailTemplate(email) => {
            if email.plain_text_content.is_none() {
                report.record(
                    node,
                    ProblemKind::MissingField,
                    format!("Email template {} has no plain text content.", describe(node)),
                );
            }
            if email.reply_to_email_address.is_some() && email.reply_to_name.is_none() {
                report.record(
                    node,
                    ProblemKind::MissingField,
                    format!(
                        "Email template {} has a reply-to address but no reply-to name.",
                        describe(node)
                    ),
                );
            }
        }
        ContentKind::EventPage(event) => {
            if let (Some(start), Some(end)) = (event.date, event.end_date) {
                if end < start {
                    report.record(
                        node,
                        ProblemKind::Validation,
                        format!(
                            "Event {} ends ({}) before it starts ({}).",
                            describe(node),
                            end.to_rfc3339(),
                            start.to_rfc3339()
                        ),
                    );
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_choice(question: &Content, choice: &Content, report: &mut ProblemReport) {
    let ContentKind::Choice(details) = &choice.kind else {
        return;
    };
    match choice.class_name.as_str() {
        "Quantity" => {
            let parses = choice
                .fields
                .value
                .as_deref()
                .map(|v| v.trim().parse::<f64>().is_ok())
                .unwrap_or(false);
            if !parses {
                report.record(
                    question,
                    ProblemKind::Validation,
                    format!(
                        "Numeric question {} has a quantity choice whose value '{}' is not a number.",
                        describe(question),
                        choice.fields.value.as_deref().unwrap_or_default()
                    ),
                );
            }
        }
        "Formula" | "ChemicalFormula" | "LogicFormula" => {
            if let Some(expr) = details.attributes.python_expression.as_deref() {
                if expr.contains('\\') {
                    report.record(
                        question,
                        ProblemKind::Validation,
                        format!(
                            "Symbolic question {} has a formula with a backslash: '{}'.",
                            describe(question),
                            expr
                        ),
                    );
                }
            }
        }
        _ => {}
    }
}

fn is_correct_choice(choice: &Content) -> bool {
    matches!(&choice.kind, ContentKind::Choice(c) if c.attributes.correct)
}

/// Records a problem for every `relatedContent` id with no matching object.
pub fn check_related_content(contents: &BTreeMap<String, Content>, report: &mut ProblemReport) {
    for content in contents.values() {
        for related in &content.fields.related_content {
            if !contents.contains_key(related) {
                report.record(
                    content,
                    ProblemKind::DanglingReference,
                    format!(
                        "Content {} references related content '{}' which does not exist.",
                        describe(content),
                        related
                    ),
                );
            }
        }
    }
}

fn describe(content: &Content) -> String {
    match (content.id(), content.fields.canonical_source_file.as_deref()) {
        (Some(id), Some(file)) => format!("'{}' in {}", id, file),
        (Some(id), None) => format!("'{}'", id),
        (None, Some(file)) => format!("in {}", file),
        (None, None) => format!("of type '{}'", content.content_type()),
    }
}
