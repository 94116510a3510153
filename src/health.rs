use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::directory::RepoDirectory;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub directory: CheckResult,
    pub repos_root: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// Subset of `AppState` the health check needs.
#[derive(Clone)]
pub struct HealthState {
    pub repos_root: PathBuf,
    pub directory: Arc<dyn RepoDirectory>,
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_directory(directory: &dyn RepoDirectory) -> CheckResult {
    match directory.list_enabled().await {
        Ok(names) => CheckResult {
            ok: true,
            detail: Some(format!("{} enabled repositories", names.len())),
        },
        Err(e) => CheckResult::unhealthy(format!("list_enabled failed: {e}")),
    }
}

async fn check_repos_root(path: &Path) -> CheckResult {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => CheckResult::healthy(),
        Ok(_) => CheckResult::unhealthy(format!("{} is not a directory", path.display())),
        Err(e) => CheckResult::unhealthy(format!("{}: {e}", path.display())),
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    // Nothing can be resolved without the directory.  A missing repos root
    // only means nothing has been cloned yet.
    if !checks.directory.ok {
        HealthStatus::Unhealthy
    } else if !checks.repos_root.ok {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (directory, repos_root) = tokio::join!(
        check_directory(state.directory.as_ref()),
        check_repos_root(&state.repos_root),
    );

    let checks = HealthChecks {
        directory,
        repos_root,
    };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}
