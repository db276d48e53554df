//! `memoria-server`: the HTTP/JSON surface (§6). A thin axum layer over
//! [`memoria::app::AppContext`] — every handler parses its request DTO,
//! calls straight into `AppContext`, and maps the result (or error) to a
//! response. Bearer auth, a request-body cap, and graceful shutdown are the
//! only concerns this binary owns that the core doesn't.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memoria::app::AppContext;
use memoria::auth::{extract_bearer, verify_bearer_token};
use memoria::config::{Config, MAX_REQUEST_BODY_BYTES, SHUTDOWN_DEADLINE_SECS};
use memoria::dto::{
    DeleteResponse, HealthResponse, ListQuery, ListResponse, MemoryPatch, RecallRequest, RecallResponse,
    RememberRequest, RememberResponse, SearchRequest, SearchResponse, StatsResponse,
};
use memoria::error::{MemoriaError, Result};
use memoria::store::Deadline;
use memoria::types::{Memory, SearchFilters};

#[derive(Parser, Debug)]
#[command(name = "memoria-server")]
#[command(about = "HTTP/JSON surface for the Memoria memory service")]
struct Args {
    #[command(flatten)]
    config: Config,

    /// Optional TOML config file merged underneath CLI/env values.
    #[arg(long, env = "MEMORIA_CONFIG_FILE")]
    config_file: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = args.config;
    if let Some(path) = args.config_file.as_deref() {
        config = config.merge_toml_file(std::path::Path::new(path))?;
    }

    if config.auth_token.is_none() {
        warn!("MEMORIA_AUTH_TOKEN not set; the HTTP surface is running without authentication");
    }

    let bind_addr = config.bind_addr.clone();
    let ctx = AppContext::build(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(ctx, bind_addr))
}

async fn serve(ctx: AppContext, bind_addr: String) -> Result<()> {
    let state = Arc::new(ctx);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/remember", post(remember))
        .route("/v1/recall", post(recall))
        .route("/v1/search", post(search))
        .route("/v1/memories", get(list_memories))
        .route("/v1/memories/:id", get(get_memory))
        .route("/v1/memories/:id", put(update_memory))
        .route("/v1/memories/:id", delete(delete_memory))
        .route("/v1/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "memoria-server listening");

    // `with_graceful_shutdown` on its own waits unboundedly for in-flight
    // requests to drain once `shutdown_signal` resolves. §7 "Shutdown" caps
    // that drain at `SHUTDOWN_DEADLINE_SECS`, so a background task races the
    // signal against the deadline and forces the process down if requests
    // haven't finished in time.
    tokio::spawn(async {
        shutdown_signal().await;
        info!(deadline_secs = SHUTDOWN_DEADLINE_SECS, "shutdown signal received, draining in-flight requests");
        tokio::time::sleep(std::time::Duration::from_secs(SHUTDOWN_DEADLINE_SECS)).await;
        warn!("graceful shutdown deadline exceeded, forcing exit");
        std::process::exit(0);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

type AppState = Arc<AppContext>;

/// Wraps a `MemoriaError` so `IntoResponse` can map it to the HTTP status
/// table the error type already knows (§7 "Error handling design").
struct ApiError(MemoriaError);

impl From<MemoriaError> for ApiError {
    fn from(err: MemoriaError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), ApiError> {
    let Some(configured) = state.config.auth_token.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .unwrap_or("");

    if verify_bearer_token(presented, configured) {
        Ok(())
    } else {
        Err(ApiError(MemoriaError::Unauthorized("missing or invalid bearer token".to_string())))
    }
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn remember(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RememberRequest>,
) -> std::result::Result<Json<RememberResponse>, ApiError> {
    check_auth(&state, &headers)?;
    let (id, stored) = state.remember(req, Deadline::none())?;
    Ok(Json(RememberResponse { id, stored }))
}

async fn recall(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecallRequest>,
) -> std::result::Result<Json<RecallResponse>, ApiError> {
    check_auth(&state, &headers)?;
    let out = state.recall(req, Deadline::none())?;
    Ok(Json(RecallResponse::from(out)))
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SearchRequest>,
) -> std::result::Result<Json<SearchResponse>, ApiError> {
    check_auth(&state, &headers)?;
    let results = state.search(req, Deadline::none())?;
    Ok(Json(SearchResponse { results }))
}

async fn list_memories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> std::result::Result<Json<ListResponse>, ApiError> {
    check_auth(&state, &headers)?;

    let mut filters = SearchFilters::default();
    filters.memory_type = query
        .memory_type
        .map(|t| t.parse())
        .transpose()
        .map_err(MemoriaError::InvalidInput)?;
    filters.scope = query.scope.map(|s| s.parse()).transpose().map_err(MemoriaError::InvalidInput)?;
    filters.project = query.project;
    if let Some(tags) = query.tags {
        filters.tags = tags.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect();
    }

    let limit = query.limit.unwrap_or(50);
    let cursor = query.cursor.unwrap_or_default();
    let (memories, next_cursor) = state.list(&filters, limit, &cursor, Deadline::none())?;

    Ok(Json(ListResponse { memories, next_cursor }))
}

async fn get_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> std::result::Result<Json<Memory>, ApiError> {
    check_auth(&state, &headers)?;
    let memory = state.get(&id, Deadline::none())?;
    Ok(Json(memory))
}

async fn update_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<MemoryPatch>,
) -> std::result::Result<Json<Memory>, ApiError> {
    check_auth(&state, &headers)?;
    let memory = state.update(&id, patch, Deadline::none())?;
    Ok(Json(memory))
}

async fn delete_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    check_auth(&state, &headers)?;
    let deleted = state.forget(&id, Deadline::none())?;
    if deleted {
        Ok((StatusCode::OK, Json(DeleteResponse { deleted: true })).into_response())
    } else {
        Ok(ApiError(MemoriaError::NotFound(id)).into_response())
    }
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> std::result::Result<Json<StatsResponse>, ApiError> {
    check_auth(&state, &headers)?;
    let stats = state.stats(Deadline::none())?;
    Ok(Json(StatsResponse { stats }))
}
