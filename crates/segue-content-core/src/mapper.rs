//! Polymorphic content mapping.
//!
//! The [`ContentMapper`] turns raw JSON into persisted [`Content`] objects by
//! reading the `type` discriminator and dispatching to the [`TypeHandler`]
//! registered for it. Persisted objects are projected to [`ContentDto`]s by
//! looking up a [`TransferMapping`] keyed on the object's runtime class, so a
//! plugin type can reuse a built-in discriminator shape while supplying its
//! own transfer projection.
//!
//! Registries are filled once through [`ContentMapperBuilder`] and are
//! read-only afterwards; a built mapper is shared as `Arc<ContentMapper>`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::Error as _;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::content::{
    Choice, ChoiceAttributes, CodeSnippet, Content, ContentFields, ContentKind, EmailTemplate,
    EventPage, Media, Question, QuestionAttributes,
};
use crate::error::MappingError;
use crate::transfer::{ChoiceDto, ContentDto, ContentSummary, QuestionDto, TransferKind};

/// Builds a persisted content object from a JSON object whose `type`
/// matched this handler.
pub trait TypeHandler: Send + Sync {
    /// Runtime class given to the objects this handler produces.
    fn class_name(&self) -> &str;

    fn deserialize(
        &self,
        mapper: &ContentMapper,
        object: Map<String, Value>,
    ) -> Result<Content, MappingError>;
}

/// Projects a persisted object of one runtime class to its transfer form.
pub trait TransferMapping: Send + Sync {
    fn to_transfer(
        &self,
        mapper: &ContentMapper,
        content: &Content,
    ) -> Result<ContentDto, MappingError>;
}

/// Type discriminators of the choice handler family.
pub const CHOICE_TYPES: &[&str] = &[
    "choice",
    "quantity",
    "formula",
    "chemicalFormula",
    "logicFormula",
    "stringChoice",
    "regexPattern",
    "freeTextRule",
    "graphChoice",
    "parsonsChoice",
    "itemChoice",
];

const BASIC_TYPES: &[&str] = &[
    "content",
    "page",
    "seguePage",
    "isaacConceptPage",
    "isaacQuestionPage",
    "isaacFastTrackQuestionPage",
    "isaacTopicSummaryPage",
    "isaacPageFragment",
    "isaacWildcard",
    "glossaryTerm",
    "notification",
];

const QUESTION_TYPES: &[&str] = &[
    "question",
    "choiceQuestion",
    "isaacQuestion",
    "isaacMultiChoiceQuestion",
    "isaacNumericQuestion",
    "isaacSymbolicQuestion",
    "isaacSymbolicChemistryQuestion",
    "isaacSymbolicLogicQuestion",
    "isaacStringMatchQuestion",
    "isaacRegexMatchQuestion",
    "isaacFreeTextQuestion",
    "isaacGraphSketcherQuestion",
    "isaacParsonsQuestion",
    "isaacItemQuestion",
];

const MEDIA_TYPES: &[&str] = &["image", "figure", "video"];

/// Keys owned by [`ContentFields`] and the inline children list.
const COMMON_KEYS: &[&str] = &[
    "id",
    "type",
    "title",
    "subtitle",
    "author",
    "encoding",
    "layout",
    "value",
    "attribution",
    "relatedContent",
    "published",
    "deprecated",
    "level",
    "tags",
    "canonicalSourceFile",
    "searchableContent",
    "expandable",
    "children",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Basic,
    CodeSnippet,
    Media,
    Question,
    Choice,
    EmailTemplate,
    EventPage,
}

/// Handler for the built-in content shapes.
struct BuiltinHandler {
    class_name: String,
    shape: Shape,
}

impl TypeHandler for BuiltinHandler {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn deserialize(
        &self,
        mapper: &ContentMapper,
        mut object: Map<String, Value>,
    ) -> Result<Content, MappingError> {
        let mut content = mapper.read_base(&self.class_name, &mut object)?;
        let content_type = content.fields.content_type.clone();
        content.kind = match self.shape {
            Shape::Basic => ContentKind::Basic,
            Shape::CodeSnippet => {
                ContentKind::CodeSnippet(read_attributes::<CodeSnippet>(&content_type, &object)?)
            }
            Shape::Media => ContentKind::Media(read_attributes::<Media>(&content_type, &object)?),
            Shape::EmailTemplate => ContentKind::EmailTemplate(read_attributes::<EmailTemplate>(
                &content_type,
                &object,
            )?),
            Shape::EventPage => {
                ContentKind::EventPage(read_attributes::<EventPage>(&content_type, &object)?)
            }
            Shape::Question => {
                let hints = mapper.take_content_list(&mut object, "hints")?;
                let answer = mapper.take_content(&mut object, "answer")?.map(Box::new);
                let choices = mapper.take_content_list(&mut object, "choices")?;
                let attributes = read_attributes::<QuestionAttributes>(&content_type, &object)?;
                ContentKind::Question(Question {
                    hints,
                    answer,
                    choices,
                    attributes,
                })
            }
            Shape::Choice => {
                let explanation = mapper.take_content(&mut object, "explanation")?.map(Box::new);
                let attributes = read_attributes::<ChoiceAttributes>(&content_type, &object)?;
                ContentKind::Choice(Choice {
                    explanation,
                    attributes,
                })
            }
        };
        Ok(content)
    }
}

/// Handler for plugin types: common fields are parsed as usual and every
/// other key is kept verbatim in [`ContentKind::Extension`].
pub struct ExtensionHandler {
    class_name: String,
}

impl ExtensionHandler {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }
}

impl TypeHandler for ExtensionHandler {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn deserialize(
        &self,
        mapper: &ContentMapper,
        mut object: Map<String, Value>,
    ) -> Result<Content, MappingError> {
        let mut content = mapper.read_base(&self.class_name, &mut object)?;
        let extra: Map<String, Value> = object
            .into_iter()
            .filter(|(key, _)| !COMMON_KEYS.contains(&key.as_str()))
            .collect();
        content.kind = ContentKind::Extension(extra);
        Ok(content)
    }
}

/// Field-for-field projection used by every built-in class.
pub struct DefaultTransferMapping;

impl TransferMapping for DefaultTransferMapping {
    fn to_transfer(
        &self,
        mapper: &ContentMapper,
        content: &Content,
    ) -> Result<ContentDto, MappingError> {
        let fields = &content.fields;
        let kind = match &content.kind {
            ContentKind::Basic => TransferKind::Basic,
            ContentKind::CodeSnippet(s) => TransferKind::CodeSnippet(s.clone()),
            ContentKind::Media(m) => TransferKind::Media(m.clone()),
            ContentKind::EmailTemplate(e) => TransferKind::EmailTemplate(e.clone()),
            ContentKind::EventPage(e) => TransferKind::EventPage(e.clone()),
            ContentKind::Extension(extra) => TransferKind::Extension(extra.clone()),
            ContentKind::Question(q) => TransferKind::Question(QuestionDto {
                hints: mapper.to_transfer_list(&q.hints)?,
                choices: mapper.to_transfer_list(&q.choices)?,
                attributes: q.attributes.clone(),
            }),
            ContentKind::Choice(c) => TransferKind::Choice(ChoiceDto {
                units: c.attributes.units.clone(),
            }),
        };

        Ok(ContentDto {
            id: fields.id.clone(),
            content_type: fields.content_type.clone(),
            title: fields.title.clone(),
            subtitle: fields.subtitle.clone(),
            author: fields.author.clone(),
            encoding: fields.encoding.clone(),
            layout: fields.layout.clone(),
            value: fields.value.clone(),
            attribution: fields.attribution.clone(),
            related_content: fields
                .related_content
                .iter()
                .map(ContentSummary::unresolved)
                .collect(),
            published: fields.published,
            deprecated: fields.deprecated,
            level: fields.level,
            tags: fields.tags.clone(),
            expandable: fields.expandable,
            children: mapper.to_transfer_list(&content.children)?,
            kind,
        })
    }
}

/// Registers handlers and transfer mappings before the mapper is shared.
#[derive(Default)]
pub struct ContentMapperBuilder {
    handlers: HashMap<String, Arc<dyn TypeHandler>>,
    transfers: HashMap<String, Arc<dyn TransferMapping>>,
}

impl ContentMapperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder pre-loaded with every built-in content type.
    pub fn with_defaults() -> Self {
        let groups: [(&[&str], Shape); 5] = [
            (BASIC_TYPES, Shape::Basic),
            (QUESTION_TYPES, Shape::Question),
            (MEDIA_TYPES, Shape::Media),
            (CHOICE_TYPES, Shape::Choice),
            (&["codeSnippet"], Shape::CodeSnippet),
        ];
        let mut builder = Self::new();
        for (types, shape) in groups {
            for content_type in types {
                builder = builder.register_builtin(content_type, shape);
            }
        }
        builder
            .register_builtin("emailTemplate", Shape::EmailTemplate)
            .register_builtin("isaacEventPage", Shape::EventPage)
    }

    fn register_builtin(self, content_type: &str, shape: Shape) -> Self {
        let class_name = class_name_for(content_type);
        self.register_transfer(class_name.clone(), DefaultTransferMapping)
            .register_type(content_type, BuiltinHandler { class_name, shape })
    }

    /// Registers (or replaces) the handler for a type discriminator.
    pub fn register_type(
        mut self,
        content_type: impl Into<String>,
        handler: impl TypeHandler + 'static,
    ) -> Self {
        self.handlers.insert(content_type.into(), Arc::new(handler));
        self
    }

    /// Registers (or replaces) the transfer mapping for a runtime class.
    pub fn register_transfer(
        mut self,
        class_name: impl Into<String>,
        mapping: impl TransferMapping + 'static,
    ) -> Self {
        self.transfers.insert(class_name.into(), Arc::new(mapping));
        self
    }

    /// Registers a plugin type whose extra fields pass through unchanged.
    pub fn register_extension(
        self,
        content_type: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        let class_name = class_name.into();
        self.register_transfer(class_name.clone(), DefaultTransferMapping)
            .register_type(content_type, ExtensionHandler::new(class_name))
    }

    pub fn build(self) -> ContentMapper {
        debug!(
            types = self.handlers.len(),
            classes = self.transfers.len(),
            "Content mapper built"
        );
        ContentMapper {
            handlers: self.handlers,
            transfers: self.transfers,
        }
    }
}

/// Type registry plus persisted → transfer mapping table.
pub struct ContentMapper {
    handlers: HashMap<String, Arc<dyn TypeHandler>>,
    transfers: HashMap<String, Arc<dyn TransferMapping>>,
}

impl ContentMapper {
    pub fn builder() -> ContentMapperBuilder {
        ContentMapperBuilder::new()
    }

    /// A mapper with every built-in type registered.
    pub fn with_defaults() -> Self {
        ContentMapperBuilder::with_defaults().build()
    }

    /// Registered type discriminators, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Deserializes one content file read at `version`.
    pub fn deserialize(&self, version: &str, bytes: &[u8]) -> Result<Content, MappingError> {
        let value: Value = serde_json::from_slice(bytes)?;
        self.deserialize_value(value).map_err(|e| {
            debug!(version, error = %e, "Content deserialization failed");
            e
        })
    }

    /// Deserializes an already-parsed JSON value.
    pub fn deserialize_value(&self, value: Value) -> Result<Content, MappingError> {
        let object = match value {
            Value::Object(map) => map,
            other => return Err(MappingError::NotAnObject(json_kind(&other))),
        };
        let content_type = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MappingError::MissingType)?;
        let handler = self
            .handlers
            .get(content_type)
            .ok_or_else(|| MappingError::UnknownType(content_type.to_string()))?;
        handler.deserialize(self, object)
    }

    /// Projects a persisted object to its transfer form by runtime class.
    pub fn to_transfer(&self, content: &Content) -> Result<ContentDto, MappingError> {
        let mapping = self
            .transfers
            .get(&content.class_name)
            .ok_or_else(|| MappingError::NoTransferMapping(content.class_name.clone()))?;
        mapping.to_transfer(self, content)
    }

    pub fn to_transfer_list(&self, items: &[Content]) -> Result<Vec<ContentDto>, MappingError> {
        items.iter().map(|c| self.to_transfer(c)).collect()
    }

    /// Canonical JSON document stored in the search index.
    pub fn to_document(&self, content: &Content) -> Result<Value, MappingError> {
        Ok(content.to_document()?)
    }

    /// Maps indexed documents back to content objects, skipping any that no
    /// longer deserialize.
    pub fn map_documents(&self, documents: Vec<Value>) -> Vec<Content> {
        documents
            .into_iter()
            .filter_map(|doc| match self.deserialize_value(doc) {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!(error = %e, "Skipping unmappable search document");
                    None
                }
            })
            .collect()
    }

    /// Parses the common fields and inline children of `object`, removing
    /// `children` from it. Remaining keys stay available to the caller.
    pub fn read_base(
        &self,
        class_name: &str,
        object: &mut Map<String, Value>,
    ) -> Result<Content, MappingError> {
        let children = self.take_content_list(object, "children")?;
        let fields: ContentFields = read_attributes(
            object.get("type").and_then(Value::as_str).unwrap_or_default(),
            object,
        )?;
        Ok(Content {
            class_name: class_name.to_string(),
            fields,
            children,
            kind: ContentKind::Basic,
        })
    }

    /// Removes `key` from `object` and deserializes it as a content list.
    pub fn take_content_list(
        &self,
        object: &mut Map<String, Value>,
        key: &str,
    ) -> Result<Vec<Content>, MappingError> {
        match object.remove(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.into_iter().map(|v| self.child(v)).collect(),
            Some(other) => Err(MappingError::Malformed {
                content_type: object
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                source: serde_json::Error::custom(format!(
                    "'{}' must be an array, found {}",
                    key,
                    json_kind(&other)
                )),
            }),
        }
    }

    /// Removes `key` from `object` and deserializes it as a single node.
    pub fn take_content(
        &self,
        object: &mut Map<String, Value>,
        key: &str,
    ) -> Result<Option<Content>, MappingError> {
        match object.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.child(value).map(Some),
        }
    }

    fn child(&self, value: Value) -> Result<Content, MappingError> {
        match value {
            Value::String(text) => Ok(Content::markdown(text)),
            other => self.deserialize_value(other),
        }
    }
}

fn read_attributes<T: DeserializeOwned>(
    content_type: &str,
    object: &Map<String, Value>,
) -> Result<T, MappingError> {
    serde_json::from_value(Value::Object(object.clone())).map_err(|source| {
        MappingError::Malformed {
            content_type: content_type.to_string(),
            source,
        }
    })
}

/// `isaacNumericQuestion` → `IsaacNumericQuestion`.
fn class_name_for(content_type: &str) -> String {
    let mut chars = content_type.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> ContentMapper {
        ContentMapper::with_defaults()
    }

    #[test]
    fn test_choice_family_registered() {
        let mapper = mapper();
        let types = mapper.registered_types();
        for choice_type in CHOICE_TYPES {
            assert!(types.contains(choice_type), "missing {}", choice_type);
        }
    }

    #[test]
    fn test_deserialize_string_children_as_markdown() {
        let content = mapper()
            .deserialize(
                "v1",
                br#"{"id":"p1","type":"page","title":"Intro","children":["hello",{"type":"content","value":"world"}]}"#,
            )
            .unwrap();
        assert_eq!(content.class_name, "Page");
        assert_eq!(content.children.len(), 2);
        assert_eq!(content.children[0].fields.value.as_deref(), Some("hello"));
        assert_eq!(content.children[0].fields.encoding.as_deref(), Some("markdown"));
    }

    #[test]
    fn test_missing_type_is_an_error() {
        let err = mapper().deserialize("v1", br#"{"id":"x"}"#).unwrap_err();
        assert!(matches!(err, MappingError::MissingType));
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let err = mapper()
            .deserialize("v1", br#"{"id":"x","type":"hologram"}"#)
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownType(t) if t == "hologram"));
    }

    #[test]
    fn test_unknown_child_type_fails_parent() {
        let err = mapper()
            .deserialize_value(json!({
                "id": "x", "type": "content",
                "children": [{"type": "hologram"}]
            }))
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownType(_)));
    }

    #[test]
    fn test_question_transfer_hides_answer_and_correctness() {
        let mapper = mapper();
        let content = mapper
            .deserialize_value(json!({
                "id": "q1",
                "type": "isaacMultiChoiceQuestion",
                "answer": {"type": "content", "value": "secret"},
                "hints": ["try harder"],
                "choices": [
                    {"type": "choice", "value": "A", "correct": true,
                     "explanation": {"type": "content", "value": "because"}},
                    {"type": "choice", "value": "B"}
                ]
            }))
            .unwrap();

        match &content.kind {
            ContentKind::Question(q) => {
                assert!(q.answer.is_some());
                assert_eq!(q.choices.len(), 2);
            }
            other => panic!("expected question, got {:?}", other),
        }

        let dto = mapper.to_transfer(&content).unwrap();
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("answer").is_none());
        assert_eq!(json["hints"][0]["value"], "try harder");
        assert_eq!(json["choices"][0]["value"], "A");
        assert!(json["choices"][0].get("correct").is_none());
        assert!(json["choices"][0].get("explanation").is_none());
    }

    #[test]
    fn test_expandable_survives_to_transfer() {
        let mapper = mapper();
        let content = mapper
            .deserialize_value(json!({
                "id": "snip", "type": "codeSnippet", "expandable": true,
                "language": "python", "code": "print(1)"
            }))
            .unwrap();
        assert_eq!(content.fields.expandable, Some(true));
        let dto = mapper.to_transfer(&content).unwrap();
        assert_eq!(dto.expandable, Some(true));
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["expandable"], true);
        assert_eq!(json["language"], "python");
    }

    #[test]
    fn test_transfer_drops_indexing_fields() {
        let mapper = mapper();
        let mut content = mapper
            .deserialize_value(json!({
                "id": "a", "type": "content", "searchableContent": "hidden",
                "relatedContent": ["b"]
            }))
            .unwrap();
        content.fields.canonical_source_file = Some("a.json".into());
        let json = serde_json::to_value(mapper.to_transfer(&content).unwrap()).unwrap();
        assert!(json.get("searchableContent").is_none());
        assert!(json.get("canonicalSourceFile").is_none());
        assert_eq!(json["relatedContent"][0]["id"], "b");
    }

    #[test]
    fn test_transfer_dispatches_on_runtime_class() {
        struct Shouting;
        impl TransferMapping for Shouting {
            fn to_transfer(
                &self,
                mapper: &ContentMapper,
                content: &Content,
            ) -> Result<ContentDto, MappingError> {
                let mut dto = DefaultTransferMapping.to_transfer(mapper, content)?;
                dto.value = dto.value.map(|v| v.to_uppercase());
                Ok(dto)
            }
        }

        let mapper = ContentMapperBuilder::with_defaults()
            .register_type("quiz", ExtensionHandler::new("Quiz"))
            .register_transfer("Quiz", Shouting)
            .build();
        let content = mapper
            .deserialize_value(json!({"id": "z", "type": "quiz", "value": "hi", "rounds": 3}))
            .unwrap();
        assert_eq!(content.class_name, "Quiz");
        let dto = mapper.to_transfer(&content).unwrap();
        assert_eq!(dto.value.as_deref(), Some("HI"));
        assert_eq!(serde_json::to_value(&dto).unwrap()["rounds"], 3);
    }

    #[test]
    fn test_missing_transfer_mapping() {
        let mapper = ContentMapperBuilder::with_defaults()
            .register_type("quiz", ExtensionHandler::new("Quiz"))
            .build();
        let content = mapper
            .deserialize_value(json!({"id": "z", "type": "quiz"}))
            .unwrap();
        let err = mapper.to_transfer(&content).unwrap_err();
        assert!(matches!(err, MappingError::NoTransferMapping(c) if c == "Quiz"));
    }

    #[test]
    fn test_map_documents_skips_bad_entries() {
        let docs = vec![
            json!({"id": "a", "type": "content"}),
            json!({"id": "b", "type": "nope"}),
            json!("not an object"),
        ];
        let contents = mapper().map_documents(docs);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].id(), Some("a"));
    }

    #[test]
    fn test_document_round_trips_through_mapper() {
        let mapper = mapper();
        let original = mapper
            .deserialize_value(json!({
                "id": "q", "type": "isaacNumericQuestion", "requireUnits": true,
                "choices": [{"type": "quantity", "value": "9.81", "units": "m s^-2", "correct": true}]
            }))
            .unwrap();
        let doc = mapper.to_document(&original).unwrap();
        let again = mapper.deserialize_value(doc).unwrap();
        assert_eq!(original, again);
    }
}
