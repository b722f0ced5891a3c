//! # Segue Content Core
//!
//! Runtime-independent logic for the Segue content platform: persisted and
//! transfer content models, the polymorphic content mapper, tree flattening
//! and augmentation, content validation, the version store abstraction and
//! the search provider abstraction with its ranking rules.
//!
//! This crate contains no tokio, sqlx, process spawning or filesystem I/O.
//! The `segue-content` crate supplies the git and SQLite backends, the
//! indexer, the content manager and the HTTP facade on top of it.

pub mod content;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod search;
pub mod transfer;
pub mod tree;
pub mod validate;
pub mod version;

pub use content::{Content, ContentKind, ID_SEPARATOR};
pub use error::{ContentError, MappingError, SearchError, StoreError};
pub use mapper::{ContentMapper, ContentMapperBuilder};
pub use search::{IndexType, ResultsWrapper, SearchProvider};
pub use transfer::ContentDto;
pub use version::{VersionInfo, VersionStore};
