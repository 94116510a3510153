//! Internal repository API: catalog lookups, batch registration, sync
//! triggering and the dependency-gap filter.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::handler::AppError;
use crate::deps::{self, DependencyReference};
use crate::directory::{NewRepo, RepositoryRecord};
use crate::sync::SyncSnapshot;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct InsertBatchResponse {
    pub inserted: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnindexedDependenciesRequest {
    pub repo: String,
    pub language: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyReference>,
}

/// `POST /repos/sync`
///
/// Runs every configured host once.  The run is a detached task, so it
/// completes even if the caller disconnects before the response.
#[instrument(skip(state))]
pub async fn handle_sync(State(state): State<Arc<AppState>>) -> Result<&'static str, AppError> {
    let snapshot = SyncSnapshot::capture(&state.config.borrow());
    let orchestrator = Arc::clone(&state.orchestrator);

    let summary = tokio::spawn(async move { orchestrator.run(&snapshot).await })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("sync task failed: {e}")))?;

    info!(
        passes = summary.passes.len(),
        failed_hosts = summary.failed_hosts.len(),
        "sync triggered over HTTP finished"
    );
    Ok("OK")
}

/// `GET /repos/by-name/{name...}`
#[instrument(skip(state))]
pub async fn handle_by_name(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RepositoryRecord>, AppError> {
    Ok(Json(state.directory.resolve(&name).await?))
}

/// `POST /repos/create-if-not-exists`
#[instrument(skip(state, req), fields(repo = %req.name))]
pub async fn handle_create_if_not_exists(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewRepo>,
) -> Result<Json<RepositoryRecord>, AppError> {
    state
        .directory
        .insert_if_absent(std::slice::from_ref(&req))
        .await?;
    Ok(Json(state.directory.resolve(&req.name).await?))
}

/// `POST /repos/insert-batch`
#[instrument(skip(state, entries), fields(count = entries.len()))]
pub async fn handle_insert_batch(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<NewRepo>>,
) -> Result<Json<InsertBatchResponse>, AppError> {
    let inserted = state.directory.insert_if_absent(&entries).await?;
    Ok(Json(InsertBatchResponse { inserted }))
}

/// `GET /repos/list-enabled`
pub async fn handle_list_enabled(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.directory.list_enabled().await?))
}

/// `POST /repos/unindexed-dependencies`
#[instrument(skip(state, req), fields(repo = %req.repo, language = %req.language))]
pub async fn handle_unindexed_dependencies(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnindexedDependenciesRequest>,
) -> Result<Json<Vec<DependencyReference>>, AppError> {
    state.directory.resolve(&req.repo).await?;
    let unfetched =
        deps::unfetched(state.packages.as_ref(), &req.language, req.dependencies).await?;
    Ok(Json(unfetched))
}
