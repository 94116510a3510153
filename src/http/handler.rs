//! Main axum router and the smart-HTTP request handlers.
//!
//! Routes:
//! - `GET  /git/{repo...}/info/refs`        - Ref advertisement (upload-pack only)
//! - `POST /git/{repo...}/git-upload-pack`  - Pack negotiation / data transfer
//! - `POST /git/{repo...}/git-receive-pack` - Always rejected (403)
//! - `/repos/...`                           - Internal catalog and sync API
//! - `GET  /ping`                           - Liveness probe
//! - `GET  /healthz`                        - Health check
//! - `GET  /metrics`                        - Prometheus metrics

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::TryStreamExt;
use serde::Deserialize;
use tracing::{error, instrument, warn};

use super::repos;
use crate::bridge::{ensure_enabled, UPLOAD_PACK_SERVICE};
use crate::error::Error;
use crate::git::ByteStream;
use crate::metrics::GitService;
use crate::AppState;

const RECEIVE_PACK_SERVICE: &str = "git-receive-pack";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Git smart HTTP protocol endpoints.  Repository names contain
        // slashes, so the service is recognised by path suffix.
        .route("/git/{*path}", get(handle_git_get).post(handle_git_post))
        // Internal API
        .route("/repos/sync", post(repos::handle_sync))
        .route("/repos/by-name/{*name}", get(repos::handle_by_name))
        .route(
            "/repos/create-if-not-exists",
            post(repos::handle_create_if_not_exists),
        )
        .route("/repos/insert-batch", post(repos::handle_insert_batch))
        .route("/repos/list-enabled", get(repos::handle_list_enabled))
        .route(
            "/repos/unindexed-dependencies",
            post(repos::handle_unindexed_dependencies),
        )
        // Ping, health, metrics
        .route("/ping", get(handle_ping))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query parameter types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InfoRefsQuery {
    service: Option<String>,
}

// ---------------------------------------------------------------------------
// Path parsing
// ---------------------------------------------------------------------------

/// Strip `suffix` and an optional `.git` from a wildcard path, yielding the
/// repository name.
fn repo_name<'a>(path: &'a str, suffix: &str) -> Option<&'a str> {
    let repo = path.strip_suffix(suffix)?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    (!repo.is_empty()).then_some(repo)
}

// ---------------------------------------------------------------------------
// Git handlers
// ---------------------------------------------------------------------------

/// `GET /git/{repo...}/info/refs?service=git-upload-pack`
#[instrument(skip(state, query))]
async fn handle_git_get(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<InfoRefsQuery>,
) -> Response {
    let Some(repo) = repo_name(&path, "/info/refs") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let service = query.service.unwrap_or_default();

    let response = match state.bridge.advertise_refs(repo, &service).await {
        Ok(adv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, adv.content_type),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            adv.body,
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    };

    state
        .metrics
        .record_git_request(GitService::InfoRefs, response.status().as_u16());
    response
}

/// `POST /git/{repo...}/git-upload-pack` and `git-receive-pack`
#[instrument(skip(state, headers, body))]
async fn handle_git_post(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if let Some(repo) = repo_name(&path, &format!("/{RECEIVE_PACK_SERVICE}")) {
        warn!(%repo, "rejected git-receive-pack (push)");
        state
            .metrics
            .record_git_request(GitService::ReceivePack, StatusCode::FORBIDDEN.as_u16());
        return AppError::from(Error::UnsupportedProtocolOperation(
            RECEIVE_PACK_SERVICE.to_string(),
        ))
        .into_response();
    }

    let Some(repo) = repo_name(&path, &format!("/{UPLOAD_PACK_SERVICE}")) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let response = if headers.contains_key(header::CONTENT_ENCODING) {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "compressed upload-pack requests are not supported",
        )
            .into_response()
    } else if let Err(e) = ensure_served(&state, repo).await {
        AppError::from(e).into_response()
    } else {
        let request: ByteStream = Box::pin(body.into_data_stream().map_err(io::Error::other));
        match state.bridge.proxy_upload_pack(repo, request).await {
            Ok(resp) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, resp.content_type),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                Body::from_stream(resp.body),
            )
                .into_response(),
            Err(e) => AppError::from(e).into_response(),
        }
    };

    state
        .metrics
        .record_git_request(GitService::UploadPack, response.status().as_u16());
    response
}

/// Enabled gate for the upload-pack exchange.  Runs before git is spawned,
/// so a disabled repository is neither advertised nor proxied.
async fn ensure_served(state: &AppState, repo: &str) -> crate::error::Result<()> {
    let record = state.directory.resolve(repo).await?;
    ensure_enabled(&record)
}

// ---------------------------------------------------------------------------
// Ping, health, metrics
// ---------------------------------------------------------------------------

/// `GET /ping`
async fn handle_ping() -> &'static str {
    "pong"
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        repos_root: state.repos_root.clone(),
        directory: Arc::clone(&state.directory),
    };
    crate::health::health_handler(axum::extract::State(health_state)).await
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// A failure reported by the bridge, the directory or a collaborator.
    Core(Error),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Core(err) => match err {
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::UnsupportedProtocolOperation(s) if s == RECEIVE_PACK_SERVICE => {
                    StatusCode::FORBIDDEN
                }
                Error::UnsupportedProtocolOperation(_) => StatusCode::BAD_REQUEST,
                Error::Disabled(_) => StatusCode::FORBIDDEN,
                Error::UpstreamExecution(_) => StatusCode::BAD_GATEWAY,
                Error::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Transport(_) | Error::Framing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Core(err) if status.is_server_error() => {
                error!(error = %err, kind = err.kind(), "request failed");
            }
            AppError::Core(err) => {
                warn!(error = %err, kind = err.kind(), "request rejected");
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
            }
        }
        let message = match self {
            // Protocol rejections write no body; the reason is only logged.
            AppError::Core(Error::UnsupportedProtocolOperation(_)) => String::new(),
            AppError::Core(err) => format!("{err}\n"),
            AppError::Internal(err) => format!("Internal server error: {err:#}\n"),
        };
        (status, message).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
