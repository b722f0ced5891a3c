//! Persisted content objects.
//!
//! A [`Content`] is the in-memory form of one JSON content file (or one node
//! inside it) as read from the version store. Every node carries the common
//! [`ContentFields`], its inline children, the runtime class chosen by the
//! type handler that built it, and the type-specific data in [`ContentKind`].

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Separator used when qualifying a child id with its parent's id.
pub const ID_SEPARATOR: &str = "|";

/// Fields shared by every content object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(
        default,
        deserialize_with = "trimmed_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub related_content: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(
        default,
        deserialize_with = "trimmed_set",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub searchable_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expandable: Option<bool>,
}

/// A persisted content object and its inline subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    /// Runtime class assigned by the type handler, e.g. `"CodeSnippet"`.
    pub class_name: String,
    pub fields: ContentFields,
    pub children: Vec<Content>,
    pub kind: ContentKind,
}

/// Type-specific data carried by a content object.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ContentKind {
    #[default]
    Basic,
    CodeSnippet(CodeSnippet),
    Media(Media),
    Question(Question),
    Choice(Choice),
    EmailTemplate(EmailTemplate),
    EventPage(EventPage),
    /// Fields of a plugin-registered type, kept verbatim.
    Extension(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSnippet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_highlighting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub figure_regions: Vec<Value>,
}

/// A question node. Hints, the answer and choices are full content objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Question {
    pub hints: Vec<Content>,
    pub answer: Option<Box<Content>>,
    pub choices: Vec<Content>,
    pub attributes: QuestionAttributes,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_units: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_symbols: Vec<String>,
}

/// A choice inside a question: plain choices, quantities, formulae and so on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Choice {
    pub explanation: Option<Box<Content>>,
    pub attributes: ChoiceAttributes,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceAttributes {
    #[serde(default)]
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mhchem_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_email_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    #[serde(
        default,
        deserialize_with = "flexible_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "flexible_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
}

impl Content {
    /// Creates an empty node of the given type and runtime class.
    pub fn new(content_type: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: ContentFields {
                content_type: content_type.into(),
                ..ContentFields::default()
            },
            children: Vec::new(),
            kind: ContentKind::Basic,
        }
    }

    /// A markdown node holding a bare string value.
    pub fn markdown(value: impl Into<String>) -> Self {
        let mut content = Self::new("content", "Content");
        content.fields.value = Some(value.into());
        content.fields.encoding = Some("markdown".to_string());
        content
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.fields.id = Some(id.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Content>) -> Self {
        self.children = children;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.id.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.fields.content_type
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.title.as_deref()
    }

    /// Unpublished unless explicitly marked otherwise.
    pub fn is_published(&self) -> bool {
        self.fields.published.unwrap_or(false)
    }

    pub fn is_question(&self) -> bool {
        matches!(self.kind, ContentKind::Question(_))
    }

    /// Every content object nested below this node: children, then hints,
    /// answer, choices and choice explanations.
    pub fn nested(&self) -> Vec<&Content> {
        let mut out: Vec<&Content> = self.children.iter().collect();
        match &self.kind {
            ContentKind::Question(q) => {
                out.extend(q.hints.iter());
                out.extend(q.answer.as_deref());
                out.extend(q.choices.iter());
            }
            ContentKind::Choice(c) => out.extend(c.explanation.as_deref()),
            _ => {}
        }
        out
    }

    /// Mutable counterpart of [`Content::nested`].
    pub fn nested_mut(&mut self) -> Vec<&mut Content> {
        let mut out: Vec<&mut Content> = self.children.iter_mut().collect();
        match &mut self.kind {
            ContentKind::Question(q) => {
                out.extend(q.hints.iter_mut());
                out.extend(q.answer.as_deref_mut());
                out.extend(q.choices.iter_mut());
            }
            ContentKind::Choice(c) => out.extend(c.explanation.as_deref_mut()),
            _ => {}
        }
        out
    }

    /// Compares two objects ignoring where they were loaded from.
    pub fn same_content(&self, other: &Content) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        clear_source_files(&mut a);
        clear_source_files(&mut b);
        a == b
    }

    /// Canonical JSON document for this object, as stored in the search index.
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut map = to_object(&self.fields)?;

        if !self.children.is_empty() {
            let children = self
                .children
                .iter()
                .map(Content::to_document)
                .collect::<Result<Vec<_>, _>>()?;
            map.insert("children".to_string(), Value::Array(children));
        }

        match &self.kind {
            ContentKind::Basic => {}
            ContentKind::CodeSnippet(s) => map.extend(to_object(s)?),
            ContentKind::Media(m) => map.extend(to_object(m)?),
            ContentKind::EmailTemplate(e) => map.extend(to_object(e)?),
            ContentKind::EventPage(e) => map.extend(to_object(e)?),
            ContentKind::Question(q) => {
                map.extend(to_object(&q.attributes)?);
                if !q.hints.is_empty() {
                    map.insert("hints".to_string(), documents(&q.hints)?);
                }
                if let Some(answer) = &q.answer {
                    map.insert("answer".to_string(), answer.to_document()?);
                }
                if !q.choices.is_empty() {
                    map.insert("choices".to_string(), documents(&q.choices)?);
                }
            }
            ContentKind::Choice(c) => {
                map.extend(to_object(&c.attributes)?);
                if let Some(explanation) = &c.explanation {
                    map.insert("explanation".to_string(), explanation.to_document()?);
                }
            }
            ContentKind::Extension(extra) => {
                for (key, value) in extra {
                    map.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }

        Ok(Value::Object(map))
    }
}

fn clear_source_files(content: &mut Content) {
    let mut stack = vec![content];
    while let Some(node) = stack.pop() {
        node.fields.canonical_source_file = None;
        stack.extend(node.nested_mut());
    }
}

fn documents(items: &[Content]) -> Result<Value, serde_json::Error> {
    items
        .iter()
        .map(Content::to_document)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Serializes a struct to a JSON object map.
pub(crate) fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn trimmed_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect())
}

fn trimmed_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(trimmed_list(deserializer)?
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect())
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| D::Error::custom("timestamp must be an integer"))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", millis)))
        }
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!(
            "expected a timestamp, found {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_trim_tags_and_related_content() {
        let fields: ContentFields = serde_json::from_value(serde_json::json!({
            "id": "a",
            "type": "content",
            "tags": [" physics ", "maths", ""],
            "relatedContent": [" b "],
        }))
        .unwrap();
        assert_eq!(
            fields.tags.iter().collect::<Vec<_>>(),
            vec!["maths", "physics"]
        );
        assert_eq!(fields.related_content, vec!["b"]);
    }

    #[test]
    fn test_null_lists_are_empty() {
        let fields: ContentFields = serde_json::from_value(serde_json::json!({
            "type": "content",
            "tags": null,
            "relatedContent": null,
        }))
        .unwrap();
        assert!(fields.tags.is_empty());
        assert!(fields.related_content.is_empty());
    }

    #[test]
    fn test_event_dates_accept_millis_and_rfc3339() {
        let event: EventPage = serde_json::from_value(serde_json::json!({
            "date": 1_700_000_000_000i64,
            "endDate": "2023-11-15T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(event.date.unwrap().timestamp(), 1_700_000_000);
        assert!(event.end_date.is_some());
    }

    #[test]
    fn test_nested_includes_question_parts() {
        let mut question = Content::new("isaacQuestion", "IsaacQuestion");
        question.children.push(Content::markdown("stem"));
        question.kind = ContentKind::Question(Question {
            hints: vec![Content::markdown("hint")],
            answer: Some(Box::new(Content::markdown("answer"))),
            choices: vec![Content::new("choice", "Choice")],
            attributes: QuestionAttributes::default(),
        });
        assert_eq!(question.nested().len(), 4);
        assert_eq!(question.nested_mut().len(), 4);
    }

    #[test]
    fn test_same_content_ignores_source_file() {
        let mut a = Content::markdown("x").with_id("a");
        let mut b = a.clone();
        a.fields.canonical_source_file = Some("one.json".into());
        b.fields.canonical_source_file = Some("two.json".into());
        assert!(a.same_content(&b));
        b.fields.value = Some("y".into());
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_document_contains_kind_fields() {
        let mut snippet = Content::new("codeSnippet", "CodeSnippet").with_id("s1");
        snippet.fields.expandable = Some(true);
        snippet.kind = ContentKind::CodeSnippet(CodeSnippet {
            language: Some("python".into()),
            code: Some("print(1)".into()),
            ..CodeSnippet::default()
        });
        let doc = snippet.to_document().unwrap();
        assert_eq!(doc["id"], "s1");
        assert_eq!(doc["type"], "codeSnippet");
        assert_eq!(doc["expandable"], true);
        assert_eq!(doc["language"], "python");
    }
}
