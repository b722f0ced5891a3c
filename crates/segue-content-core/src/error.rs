//! Error types shared by the content pipeline.
//!
//! Access-category errors ([`StoreError`], [`SearchError`]) abort the
//! operation that raised them. Validation-category failures are not errors
//! at all: they are collected into a [`ProblemReport`](crate::validate::ProblemReport)
//! while indexing carries on.

use thiserror::Error;

/// Result type for version store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for search provider operations.
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors raised while reading the version-controlled content tree.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying repository could not be read.
    #[error("content store access failed: {0}")]
    Access(String),

    /// More than one object matched a path or suffix lookup.
    #[error("multiple objects match '{pattern}' at version {version}: {}", matches.join(", "))]
    Ambiguous {
        version: String,
        pattern: String,
        matches: Vec<String>,
    },

    /// The version identifier does not resolve to a snapshot.
    #[error("unknown content version: {0}")]
    UnknownVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning raw bytes into content objects, or content
/// objects into transfer objects.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("unable to parse content: there is no type property within the json input")]
    MissingType,

    #[error("no content type handler registered for type '{0}'")]
    UnknownType(String),

    #[error("malformed '{content_type}' content: {source}")]
    Malformed {
        content_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("content must be a json object, found {0}")]
    NotAnObject(&'static str),

    #[error("no transfer mapping registered for content class '{0}'")]
    NoTransferMapping(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The backend is unavailable or rejected the request.
    #[error("search operation failed: {0}")]
    Backend(String),

    #[error("search document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A storage-backed index failed at the database layer.
    #[error("search database error: {0}")]
    Database(String),
}

/// Errors surfaced by the content facade to its callers.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content '{id}' not found at version {version}")]
    NotFound { version: String, id: String },

    #[error("content version not found: {0}")]
    UnknownVersion(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ContentError {
    /// Whether this error means "absent" rather than "broken".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContentError::NotFound { .. }
                | ContentError::UnknownVersion(_)
                | ContentError::Store(StoreError::UnknownVersion(_))
        )
    }
}
