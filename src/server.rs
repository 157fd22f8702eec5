//! HTTP API.
//!
//! Exposes the analysis service as JSON over HTTP. Computations for the same
//! project and analysis kind are serialized, so concurrent requests for one
//! artifact compute it once and the rest are served from the cache.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/projects` | Configured projects |
//! | `POST` | `/projects/{id}/analyze` | Story arc |
//! | `POST` | `/projects/{id}/graph` | Character graph |
//! | `POST` | `/projects/{id}/plot-holes` | Plot holes; optional body with pass toggles and `assist` |
//! | `POST` | `/projects/{id}/plot-holes/{fingerprint}/dismiss` | Dismiss a plot hole |
//! | `POST` | `/projects/{id}/suggestions` | Plot suggestions |
//! | `GET`  | `/projects/{id}/cache/{kind}` | Fresh cached artifact or 404 |
//! | `GET`  | `/projects/{id}/export` | Cache bundle |
//! | `POST` | `/projects/{id}/import` | Restore a cache bundle |
//! | `POST` | `/generate` | Generate a plot structure |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "...", "stage": "analyze", "cached_fallback": false } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `invalid_input` | 400 |
//! | `source_error`, `not_cached` | 404 |
//! | `stale_input` | 409 |
//! | `provider_error`, `generation_error` | 502 |
//! | `cancelled` | 503 |
//! | `storage_error`, `serialization_error` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use plotline_core::detector::DetectOptions;
use plotline_core::generator::GenerateRequest;
use plotline_core::models::{AnalysisKind, CacheBundle};
use plotline_core::StageError;

use crate::app::App;
use crate::config::Config;

#[derive(Clone)]
struct AppState {
    app: Arc<App>,
    /// Cancelled on shutdown; each request runs under a child token.
    shutdown: CancellationToken,
}

/// Build the router. Exposed for tests and embedding.
pub fn router(app: Arc<App>, shutdown: CancellationToken) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/projects", get(handle_projects))
        .route("/projects/{id}/analyze", post(handle_analyze))
        .route("/projects/{id}/graph", post(handle_graph))
        .route("/projects/{id}/plot-holes", post(handle_plot_holes))
        .route(
            "/projects/{id}/plot-holes/{fingerprint}/dismiss",
            post(handle_dismiss),
        )
        .route("/projects/{id}/suggestions", post(handle_suggestions))
        .route("/projects/{id}/cache/{kind}", get(handle_cache_get))
        .route("/projects/{id}/export", get(handle_export))
        .route("/projects/{id}/import", post(handle_import))
        .route("/generate", post(handle_generate))
        .layer(cors)
        .with_state(AppState { app, shutdown })
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = Arc::new(App::open(config).await?);
    let shutdown = CancellationToken::new();
    let routes = router(app, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "plotline server listening");
    println!("Plotline server listening on http://{}", config.server.bind);

    axum::serve(listener, routes)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    cached_fallback: bool,
}

struct AppError {
    status: StatusCode,
    detail: ErrorDetail,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.detail })).into_response()
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "invalid_input" => StatusCode::BAD_REQUEST,
        "source_error" => StatusCode::NOT_FOUND,
        "stale_input" => StatusCode::CONFLICT,
        "provider_error" | "generation_error" => StatusCode::BAD_GATEWAY,
        "cancelled" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StageError> for AppError {
    fn from(e: StageError) -> Self {
        let code = e.source.code();
        AppError {
            status: status_for(code),
            detail: ErrorDetail {
                code: code.to_string(),
                message: e.source.to_string(),
                stage: Some(e.stage.as_str().to_string()),
                cached_fallback: e.cached_fallback,
            },
        }
    }
}

fn plain_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        detail: ErrorDetail {
            code: code.to_string(),
            message: message.into(),
            stage: None,
            cached_fallback: false,
        },
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    plain_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ Handlers ============

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

async fn handle_projects(State(state): State<AppState>) -> ApiResult<Value> {
    let projects = state.app.service.list_projects().await?;
    Ok(Json(json!({ "projects": projects })))
}

async fn handle_analyze(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let _flight = state.app.flights.acquire(&id, AnalysisKind::StoryArc).await;
    let arc = state.app.service.analyze_project(&id).await?;
    Ok(Json(json!(arc)))
}

async fn handle_graph(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let _flight = state.app.flights.acquire(&id, AnalysisKind::CharacterGraph).await;
    let graph = state.app.service.get_character_graph(&id).await?;
    Ok(Json(json!(graph)))
}

/// Optional body for `POST /projects/{id}/plot-holes`. Missing toggles fall
/// back to the configured defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetectBody {
    timeline: Option<bool>,
    character_consistency: Option<bool>,
    unresolved_setups: Option<bool>,
    pov: Option<bool>,
    assist: Option<bool>,
}

impl DetectBody {
    fn options(&self, defaults: &DetectOptions) -> DetectOptions {
        DetectOptions {
            timeline: self.timeline.unwrap_or(defaults.timeline),
            character_consistency: self
                .character_consistency
                .unwrap_or(defaults.character_consistency),
            unresolved_setups: self.unresolved_setups.unwrap_or(defaults.unresolved_setups),
            pov: self.pov.unwrap_or(defaults.pov),
            ..DetectOptions::default()
        }
    }
}

async fn handle_plot_holes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    let body: DetectBody = if body.iter().all(u8::is_ascii_whitespace) {
        DetectBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("invalid body: {}", e)))?
    };
    let options = body.options(&state.app.service.settings().detect);

    let _flight = state.app.flights.acquire(&id, AnalysisKind::PlotHoles).await;
    let report = state
        .app
        .service
        .detect_plot_holes(&id, Some(options), body.assist, &state.shutdown.child_token())
        .await?;
    Ok(Json(json!(report)))
}

async fn handle_dismiss(
    State(state): State<AppState>,
    Path((id, fingerprint)): Path<(String, String)>,
) -> ApiResult<Value> {
    let _flight = state.app.flights.acquire(&id, AnalysisKind::PlotHoles).await;
    let added = state.app.service.dismiss_plot_hole(&id, &fingerprint).await?;
    Ok(Json(json!({ "fingerprint": fingerprint, "dismissed": true, "newly_dismissed": added })))
}

async fn handle_suggestions(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let _flight = state.app.flights.acquire(&id, AnalysisKind::PlotSuggestions).await;
    let suggestions = state.app.service.suggest_plot(&id).await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

async fn handle_cache_get(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> ApiResult<Value> {
    let kind: AnalysisKind = kind.parse().map_err(bad_request)?;
    match state.app.service.get_cached_analysis(&id, kind).await? {
        Some(payload) => Ok(Json(json!(payload))),
        None => Err(plain_error(
            StatusCode::NOT_FOUND,
            "not_cached",
            format!("no fresh {} cached for {}", kind, id),
        )),
    }
}

async fn handle_export(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<CacheBundle> {
    Ok(Json(state.app.service.export_project_analysis(&id).await?))
}

async fn handle_import(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(bundle): Json<CacheBundle>,
) -> ApiResult<Value> {
    let imported = state.app.service.import_project_analysis(&id, bundle).await?;
    Ok(Json(json!({ "imported": imported })))
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Value> {
    let _flight = match &request.project_id {
        Some(p) => Some(state.app.flights.acquire(p, AnalysisKind::PlotStructure).await),
        None => None,
    };
    let plot = state
        .app
        .service
        .generate_plot(&request, &state.shutdown.child_token())
        .await?;
    Ok(Json(json!(plot)))
}
