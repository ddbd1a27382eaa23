//! HTTP handlers implementing the Everything-compatible wire contract from
//! spec §6. Every handler is a thin pass-through to [`everysearch_core::Coordinator`]
//! — no request parsing logic lives below the point of translating query
//! parameters into a `SearchQuery`/admin call, matching the teacher's
//! `api.rs` shape (handlers take `State<AppContext>` plus an extractor, and
//! return `Json` or an error tuple).

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use everysearch_core::{
    Coordinator, CoreError, FileTypeFilter, SearchQuery, SortKey, DEFAULT_SEARCH_COUNT,
};
use serde::Deserialize;

#[derive(Clone)]
pub struct AppContext {
    pub coordinator: Arc<Coordinator>,
    pub start_time: std::time::Instant,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn err(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match &e {
            CoreError::InvalidInput(_) | CoreError::NestedRoot { .. } => err(StatusCode::BAD_REQUEST, e),
            CoreError::RootNotFound(_) => err(StatusCode::NOT_FOUND, e),
            CoreError::StoreCorruption(_) | CoreError::Db(_) | CoreError::Pool(_) => {
                err(StatusCode::SERVICE_UNAVAILABLE, e)
            }
            _ => err(StatusCode::INTERNAL_SERVER_ERROR, e),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

pub async fn api_health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let uptime = ctx.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
    }))
}

// ---------------------------------------------------------------------------
// Search (Everything-compatible projection, spec §6)
// ---------------------------------------------------------------------------

fn default_count() -> usize {
    DEFAULT_SEARCH_COUNT
}

fn default_ascending() -> u8 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "q")]
    pub search: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_count", alias = "count")]
    pub count: usize,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_ascending")]
    pub ascending: u8,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
}

fn parse_sort(s: Option<&str>) -> SortKey {
    match s {
        Some("path") => SortKey::Path,
        Some("size") => SortKey::Size,
        Some("date_modified") => SortKey::DateModified,
        _ => SortKey::Name,
    }
}

fn parse_file_type(s: Option<&str>) -> FileTypeFilter {
    match s {
        Some("file") => FileTypeFilter::File,
        Some("directory") => FileTypeFilter::Directory,
        _ => FileTypeFilter::All,
    }
}

pub async fn api_search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = SearchQuery {
        query: params.search,
        root_prefix: params.path,
        file_type: parse_file_type(params.file_type.as_deref()),
        sort: parse_sort(params.sort.as_deref()),
        ascending: params.ascending != 0,
        offset: params.offset,
        count: params.count,
    };
    let results = ctx.coordinator.search(query)?;
    Ok(Json(results))
}

// ---------------------------------------------------------------------------
// Admin: roots (spec §6 "Admin operations")
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RootPathParam {
    pub path: String,
}

pub async fn api_list_roots(State(ctx): State<AppContext>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ctx.coordinator.list_roots()?))
}

pub async fn api_add_root(
    State(ctx): State<AppContext>,
    Json(body): Json<RootPathParam>,
) -> Result<impl IntoResponse, ApiError> {
    let root = ctx.coordinator.add_root(std::path::Path::new(&body.path))?;
    Ok(Json(root))
}

pub async fn api_remove_root(
    State(ctx): State<AppContext>,
    Json(body): Json<RootPathParam>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.coordinator.remove_root(std::path::Path::new(&body.path))?;
    Ok(Json(serde_json::json!({ "removed": true })))
}

#[derive(Debug, Deserialize, Default)]
pub struct RebuildParam {
    pub path: Option<String>,
}

pub async fn api_rebuild(
    State(ctx): State<AppContext>,
    Json(body): Json<RebuildParam>,
) -> Result<impl IntoResponse, ApiError> {
    let path = body.path.map(std::path::PathBuf::from);
    ctx.coordinator.rebuild(path.as_deref())?;
    Ok(Json(serde_json::json!({ "rebuilding": true })))
}

pub async fn api_status(State(ctx): State<AppContext>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ctx.coordinator.status()?))
}

// ---------------------------------------------------------------------------
// Admin: ignore patterns
// ---------------------------------------------------------------------------

pub async fn api_list_ignores(State(ctx): State<AppContext>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ctx.coordinator.list_ignores()?))
}

#[derive(Debug, Deserialize)]
pub struct IgnorePatternParam {
    pub pattern: String,
}

pub async fn api_add_ignore(
    State(ctx): State<AppContext>,
    Json(body): Json<IgnorePatternParam>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.coordinator.add_ignore(&body.pattern)?;
    Ok(Json(serde_json::json!({ "added": true })))
}

pub async fn api_remove_ignore(
    State(ctx): State<AppContext>,
    Json(body): Json<IgnorePatternParam>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = ctx.coordinator.remove_ignore(&body.pattern)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn api_add_default_ignores(
    State(ctx): State<AppContext>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.coordinator.add_default_ignores()?;
    Ok(Json(serde_json::json!({ "added": true })))
}

// ---------------------------------------------------------------------------
// Router assembly — shared by the binary and by integration tests so the
// routes under test are exactly the routes served in production.
// ---------------------------------------------------------------------------

pub fn router(ctx: AppContext) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(api_health))
        .route("/api/search", axum::routing::get(api_search))
        .route(
            "/api/roots",
            axum::routing::get(api_list_roots).post(api_add_root).delete(api_remove_root),
        )
        .route("/api/rebuild", axum::routing::post(api_rebuild))
        .route("/api/status", axum::routing::get(api_status))
        .route(
            "/api/ignores",
            axum::routing::get(api_list_ignores).post(api_add_ignore).delete(api_remove_ignore),
        )
        .route("/api/ignores/defaults", axum::routing::post(api_add_default_ignores))
        .with_state(ctx)
}
