//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/tags` | Tag catalog with usage counts |
//! | `POST` | `/api/tags` | Create a tag `{ "name": ... }` |
//! | `POST` | `/api/tags/merge` | Merge tags `{ "targetName": ..., "sourceIds": [...] }` |
//! | `POST` | `/api/ai/generate` | Completion `{ "prompt": ..., "mode": "text" \| "json" }` |
//! | `GET`  | `/api/{collection}` | List records, optional `?tag=` |
//! | `POST` | `/api/{collection}` | Create a record |
//! | `GET`  | `/api/{collection}/{id}` | Fetch a record |
//! | `PATCH` | `/api/{collection}/{id}` | Update a record |
//! | `DELETE` | `/api/{collection}/{id}` | Delete a record |
//! | `GET`  | `/api/notes/{id}/backlinks` | Notes referring to a note |
//! | `GET`  | `/api/trending` | Trending papers, optional `?limit=` |
//!
//! `{collection}` is one of `tasks`, `papers`, `notes`, `journal`.
//!
//! # Error Contract
//!
//! Every error response is `{ "error": "<message>" }` with a matching
//! status: `400` for invalid input, `404` for unknown records or
//! collections, `502` when no completion provider produced a result, and
//! `500` for everything else (including a failed merge). Statuses come
//! from explicit checks in each handler or from the [`AtelierError`]
//! variant inside a library error, never from message text.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::backlinks::{find_backlinks, Backlink};
use crate::completion::{CompletionGateway, CompletionOutput, CompletionRequest};
use crate::config::Config;
use crate::db;
use crate::error::AtelierError;
use crate::merge::{merge_tags, MergeReport};
use crate::migrate;
use crate::models::{Collection, NewRecord, Record, RecordPatch, Tag, TagSummary};
use crate::records;
use crate::store::{SqliteStore, TagStore};
use crate::trending::{collect_trending, TrendingPaper};

const DEFAULT_TRENDING_LIMIT: usize = 20;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub gateway: Arc<CompletionGateway>,
}

/// Connects to the database, applies migrations, builds the completion
/// gateway from configuration and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let gateway = CompletionGateway::from_config(&config.completion)?;
    if gateway.is_empty() {
        info!("no completion providers configured; /api/ai/generate will report failures");
    } else {
        info!(providers = ?gateway.providers(), "completion providers ready");
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool)),
        gateway: Arc::new(gateway),
    };

    let app = build_router(state);
    let bind_addr = &config.server.bind;
    info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes with permissive CORS.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/tags", get(handle_list_tags).post(handle_create_tag))
        .route("/api/tags/merge", post(handle_merge_tags))
        .route("/api/ai/generate", post(handle_generate))
        .route("/api/trending", get(handle_trending))
        .route("/api/notes/{id}/backlinks", get(handle_backlinks))
        .route(
            "/api/{collection}",
            get(handle_list_records).post(handle_create_record),
        )
        .route(
            "/api/{collection}/{id}",
            get(handle_get_record)
                .patch(handle_update_record)
                .delete(handle_delete_record),
        )
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

/// Library errors carry an [`AtelierError`] when they mean bad input or a
/// missing row; anything else is a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        let status = match err.downcast_ref::<AtelierError>() {
            Some(AtelierError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(AtelierError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            None => {
                error!(error = %message, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError { status, message }
    }
}

fn parse_collection(raw: &str) -> Result<Collection, AppError> {
    raw.parse::<Collection>()
        .map_err(|e| not_found(e.to_string()))
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

// ============ Tags ============

#[derive(Serialize)]
struct TagListResponse {
    tags: Vec<TagSummary>,
}

async fn handle_list_tags(
    State(state): State<AppState>,
) -> Result<Json<TagListResponse>, AppError> {
    let tags = state.store.list_tags().await?;
    Ok(Json(TagListResponse { tags }))
}

#[derive(Deserialize)]
struct CreateTagRequest {
    name: String,
}

async fn handle_create_tag(
    State(state): State<AppState>,
    Json(req): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let tag = state.store.create_tag(name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeRequest {
    target_name: String,
    #[serde(default)]
    source_ids: Vec<String>,
}

#[derive(Serialize)]
struct MergeResponse {
    success: bool,
    report: MergeReport,
}

/// Handler for `POST /api/tags/merge`.
///
/// Record-level failures are logged inside the merge and do not fail the
/// request; only a failed catalog deletion does.
async fn handle_merge_tags(
    State(state): State<AppState>,
    Json(req): Json<MergeRequest>,
) -> Result<Json<MergeResponse>, AppError> {
    if req.target_name.trim().is_empty() {
        return Err(bad_request("targetName must not be empty"));
    }

    let report = merge_tags(state.store.as_ref(), &req.target_name, &req.source_ids).await?;

    Ok(Json(MergeResponse {
        success: true,
        report,
    }))
}

// ============ POST /api/ai/generate ============

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<CompletionOutput>, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(bad_request("prompt must not be empty"));
    }

    state.gateway.generate(&req).await.map(Json).ok_or(AppError {
        status: StatusCode::BAD_GATEWAY,
        message: "generation failed".to_string(),
    })
}

// ============ Records ============

#[derive(Deserialize)]
struct ListQuery {
    tag: Option<String>,
}

async fn handle_list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Record>>, AppError> {
    let collection = parse_collection(&collection)?;
    let tag = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let records = records::list_records(&state.store, collection, tag).await?;
    Ok(Json(records))
}

async fn handle_create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(new): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>), AppError> {
    let collection = parse_collection(&collection)?;
    let record = records::create_record(&state.store, collection, new).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn handle_get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Record>, AppError> {
    let collection = parse_collection(&collection)?;
    records::get_record(&state.store, collection, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("{} record not found: {}", collection, id)))
}

async fn handle_update_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<Record>, AppError> {
    let collection = parse_collection(&collection)?;
    records::update_record(&state.store, collection, &id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("{} record not found: {}", collection, id)))
}

async fn handle_delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let collection = parse_collection(&collection)?;
    let deleted = records::delete_record(&state.store, collection, &id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("{} record not found: {}", collection, id)))
    }
}

// ============ GET /api/notes/{id}/backlinks ============

#[derive(Serialize)]
struct BacklinksResponse {
    backlinks: Vec<Backlink>,
}

async fn handle_backlinks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BacklinksResponse>, AppError> {
    let backlinks = find_backlinks(&state.store, &id).await?;
    Ok(Json(BacklinksResponse { backlinks }))
}

// ============ GET /api/trending ============

#[derive(Deserialize)]
struct TrendingQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct TrendingResponse {
    papers: Vec<TrendingPaper>,
}

async fn handle_trending(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<TrendingResponse>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_TRENDING_LIMIT);
    let papers = collect_trending(&state.config.feeds, limit).await?;
    Ok(Json(TrendingResponse { papers }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn status_follows_error_variant_not_message() {
        let plain = AppError::from(anyhow::anyhow!("upstream said: tag not found"));
        assert_eq!(plain.status, StatusCode::INTERNAL_SERVER_ERROR);

        let missing = AppError::from(anyhow::Error::from(AtelierError::NotFound(
            "note not found: n1".to_string(),
        )));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let invalid: anyhow::Result<()> =
            Err(AtelierError::InvalidInput("title must not be empty".to_string()).into());
        let invalid = AppError::from(invalid.context("creating record").unwrap_err());
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert!(invalid.message.contains("title must not be empty"));
    }
}
