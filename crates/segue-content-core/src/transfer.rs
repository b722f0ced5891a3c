//! Transfer content objects returned to API consumers.
//!
//! A [`ContentDto`] is the client-facing projection of a persisted
//! [`Content`](crate::content::Content). It keeps the same shape but never
//! carries indexing-only fields (`searchableContent`, `canonicalSourceFile`)
//! or anything that gives away a question's answer.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::content::{CodeSnippet, EmailTemplate, EventPage, Media, QuestionAttributes};

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_content: Vec<ContentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expandable: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentDto>,
    #[serde(flatten)]
    pub kind: TransferKind,
}

/// Type-specific transfer data, flattened into the parent object.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum TransferKind {
    #[default]
    Basic,
    CodeSnippet(CodeSnippet),
    Media(Media),
    Question(QuestionDto),
    Choice(ChoiceDto),
    EmailTemplate(EmailTemplate),
    EventPage(EventPage),
    Extension(Map<String, Value>),
}

/// A question without its answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<ContentDto>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ContentDto>,
    #[serde(flatten)]
    pub attributes: QuestionAttributes,
}

/// A choice without its correctness flag or explanation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// A lightweight reference to another content object.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl ContentSummary {
    /// An unresolved reference carrying only the target id.
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builds a summary from an indexed content document.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let id = doc.get("id")?.as_str()?.to_string();
        let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);
        let tags = doc
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            id,
            title: text("title"),
            content_type: text("type"),
            summary: text("subtitle"),
            tags,
        })
    }
}

impl ContentDto {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
