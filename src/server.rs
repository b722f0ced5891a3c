//! HTTP facade over the content manager and indexer.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns crate version) |
//! | `GET`  | `/versions` | Repository versions, indexed versions and the live version |
//! | `GET`  | `/content/{id}` | One content object as a transfer object |
//! | `GET`  | `/content?prefix=` | Content whose id starts with `prefix` |
//! | `GET`  | `/search?q=` | Fuzzy content search |
//! | `GET`  | `/tags` | Tags used at a version |
//! | `GET`  | `/units` | Units used by numeric questions |
//! | `GET`  | `/problems` | Content problems found while indexing |
//! | `GET`  | `/files/{*path}` | Raw file bytes (figures, media) |
//! | `POST` | `/admin/index/{version}` | Build the indices of a version |
//! | `POST` | `/admin/live/{version}` | Build a version and make it live |
//! | `DELETE` | `/admin/index/{version}` | Expunge the indices of a version |
//!
//! Every read endpoint accepts an optional `version` query parameter; the
//! live version is used when it is absent.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "content 'x' not found at version abc" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `ambiguous` (409),
//! `search_unavailable` (503), `internal` (500).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use segue_content_core::error::{ContentError, StoreError};
use segue_content_core::search::{ResultsWrapper, SearchFilters};
use segue_content_core::transfer::ContentDto;
use segue_content_core::validate::ProblemEntry;
use segue_content_core::version::VersionInfo;

use crate::app::{build_services, Services};
use crate::config::Config;
use crate::indexer::IndexOutcome;

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = build_services(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Content server listening");
    axum::serve(listener, build_router(services)).await?;
    Ok(())
}

/// All routes with CORS applied.
pub fn build_router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/versions", get(handle_versions))
        .route("/content", get(handle_prefix))
        .route("/content/{id}", get(handle_get_content))
        .route("/search", get(handle_search))
        .route("/tags", get(handle_tags))
        .route("/units", get(handle_units))
        .route("/problems", get(handle_problems))
        .route("/files/{*path}", get(handle_file))
        .route(
            "/admin/index/{version}",
            post(handle_build_index).delete(handle_expunge),
        )
        .route("/admin/live/{version}", post(handle_set_live))
        .layer(cors)
        .with_state(Arc::new(services))
}

type AppState = State<Arc<Services>>;

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        let message = err.to_string();
        if err.is_not_found() {
            return not_found(message);
        }
        match err {
            ContentError::Store(StoreError::Ambiguous { .. }) => AppError {
                status: StatusCode::CONFLICT,
                code: "ambiguous",
                message,
            },
            ContentError::Search(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "search_unavailable",
                message,
            },
            _ => {
                error!(error = %message, "Request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message,
                }
            }
        }
    }
}

// ============ Query parameters ============

#[derive(Deserialize)]
struct VersionQuery {
    version: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    /// Comma-separated content types.
    #[serde(rename = "type")]
    types: Option<String>,
    /// Comma-separated tags.
    tags: Option<String>,
    start: Option<usize>,
    limit: Option<usize>,
    version: Option<String>,
}

#[derive(Deserialize)]
struct PrefixQuery {
    prefix: Option<String>,
    start: Option<usize>,
    limit: Option<usize>,
    version: Option<String>,
}

#[derive(Deserialize)]
struct UnitsQuery {
    #[serde(default)]
    published: bool,
    version: Option<String>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn page_limit(services: &Services, limit: Option<usize>) -> Result<usize, AppError> {
    match limit {
        Some(0) => Err(bad_request("limit must be at least 1")),
        Some(limit) => Ok(limit),
        None => Ok(services.config.search.default_limit),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /versions ============

#[derive(Serialize)]
struct VersionsResponse {
    live: Option<String>,
    indexed: Vec<String>,
    versions: Vec<VersionInfo>,
}

async fn handle_versions(State(services): AppState) -> Result<Json<VersionsResponse>, AppError> {
    let manager = &services.manager;
    let live = manager.resolve_version(None).await.ok();
    Ok(Json(VersionsResponse {
        live,
        indexed: manager.list_indexed_versions().await?,
        versions: manager.list_versions().await?,
    }))
}

// ============ GET /content ============

async fn handle_get_content(
    State(services): AppState,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<ContentDto>, AppError> {
    let dto = services
        .manager
        .get_content_by_id(query.version.as_deref(), &id)
        .await?;
    Ok(Json(dto))
}

async fn handle_prefix(
    State(services): AppState,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<ResultsWrapper<ContentDto>>, AppError> {
    let prefix = query
        .prefix
        .filter(|p| !p.is_empty())
        .ok_or_else(|| bad_request("prefix must not be empty"))?;
    let limit = page_limit(&services, query.limit)?;
    let results = services
        .manager
        .get_by_id_prefix(
            query.version.as_deref(),
            &prefix,
            query.start.unwrap_or(0),
            limit,
        )
        .await?;
    Ok(Json(results))
}

// ============ GET /search ============

async fn handle_search(
    State(services): AppState,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ResultsWrapper<ContentDto>>, AppError> {
    let limit = page_limit(&services, query.limit)?;

    let mut filters = SearchFilters::new();
    let types = split_list(query.types.as_deref());
    if !types.is_empty() {
        filters.insert("type".to_string(), types);
    }
    let tags = split_list(query.tags.as_deref());
    if !tags.is_empty() {
        filters.insert("tags".to_string(), tags);
    }

    let results = services
        .manager
        .search_for_content(
            query.version.as_deref(),
            query.q.trim(),
            &filters,
            query.start.unwrap_or(0),
            limit,
        )
        .await?;
    Ok(Json(results))
}

// ============ GET /tags, /units, /problems ============

async fn handle_tags(
    State(services): AppState,
    Query(query): Query<VersionQuery>,
) -> Result<Json<BTreeSet<String>>, AppError> {
    Ok(Json(services.manager.get_tags(query.version.as_deref()).await?))
}

async fn handle_units(
    State(services): AppState,
    Query(query): Query<UnitsQuery>,
) -> Result<Json<BTreeMap<String, String>>, AppError> {
    let units = services
        .manager
        .get_units(query.version.as_deref(), query.published)
        .await?;
    Ok(Json(units))
}

async fn handle_problems(
    State(services): AppState,
    Query(query): Query<VersionQuery>,
) -> Result<Json<Vec<ProblemEntry>>, AppError> {
    Ok(Json(
        services
            .manager
            .get_problems(query.version.as_deref())
            .await?,
    ))
}

// ============ GET /files ============

async fn handle_file(
    State(services): AppState,
    Path(path): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Response, AppError> {
    let bytes = services
        .manager
        .get_file_bytes(query.version.as_deref(), &path)
        .await?;
    Ok((
        [(header::CONTENT_TYPE, content_type_for(&path))],
        bytes,
    )
        .into_response())
}

fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

// ============ /admin ============

async fn require_version(services: &Services, version: &str) -> Result<(), AppError> {
    if services.source.verify_version_exists(version).await {
        Ok(())
    } else {
        Err(not_found(format!("content version not found: {}", version)))
    }
}

async fn handle_build_index(
    State(services): AppState,
    Path(version): Path<String>,
) -> Result<Json<IndexOutcome>, AppError> {
    require_version(&services, &version).await?;
    Ok(Json(services.indexer.build_index(&version).await?))
}

async fn handle_set_live(
    State(services): AppState,
    Path(version): Path<String>,
) -> Result<Json<IndexOutcome>, AppError> {
    require_version(&services, &version).await?;
    let outcome = services.indexer.set_live(&version).await?;
    services.manager.set_live_version(Some(version));
    Ok(Json(outcome))
}

async fn handle_expunge(
    State(services): AppState,
    Path(version): Path<String>,
) -> Result<StatusCode, AppError> {
    services.indexer.expunge(&version).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some("a, b,,c ")), vec!["a", "b", "c"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("figures/a.PNG"), "image/png");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = ContentError::NotFound {
            version: "v1".into(),
            id: "x".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: AppError = ContentError::Store(StoreError::Ambiguous {
            version: "v1".into(),
            pattern: "a.png".into(),
            matches: vec!["x/a.png".into(), "y/a.png".into()],
        })
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "ambiguous");
    }
}
