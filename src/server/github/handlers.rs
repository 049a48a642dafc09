use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::github::manager::HookManager;
use crate::server::response::{ApiError, ApiResponse};
use crate::github::{Hook, RepoSearchPage, RepoSummary};
use crate::types::ObjectMeta;

#[derive(Deserialize)]
pub struct RepoPathParams {
    owner: String,
    repo: String,
}

/// Names the deployment a hook request acts on behalf of.
#[derive(Deserialize)]
pub struct HookTarget {
    namespace: String,
    name: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
}

fn hook_manager(state: &AppState) -> Result<HookManager, ApiError> {
    let callback_url = state.config.callback_url().ok_or_else(|| {
        tracing::error!("hook request rejected: public_base_url is not configured");
        ApiError::internal("Internal server error")
    })?;
    Ok(HookManager::new(
        state.github.clone(),
        state.orchestrator.clone(),
        callback_url,
        state.config.github.webhook_secret.clone(),
    ))
}

/// POST /github/repos/{owner}/{repo}/hooks
pub async fn create_repo_hook(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(params): Path<RepoPathParams>,
    Json(target): Json<HookTarget>,
) -> Result<Json<ApiResponse<Hook>>, ApiError> {
    let manager = hook_manager(&state)?;
    let hook = manager
        .get_or_create(
            &params.owner,
            &params.repo,
            &ObjectMeta::new(target.namespace, target.name),
            &auth.0.subject,
        )
        .await
        .map_err(|e| match e {
            Error::NotFound => ApiError::not_found("Deployment not found"),
            other => ApiError::from(other),
        })?;
    Ok(Json(ApiResponse::success(hook)))
}

/// GET /github/repos/{owner}/{repo}/hooks
pub async fn list_repo_hooks(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(params): Path<RepoPathParams>,
) -> Result<Json<ApiResponse<Vec<Hook>>>, ApiError> {
    let hooks = state.github.list_hooks(&params.owner, &params.repo).await?;
    Ok(Json(ApiResponse::success(hooks)))
}

/// DELETE /github/repos/{owner}/{repo}/hooks
///
/// Association-aware removal: the named deployment drops its webhook
/// association, and the remote hook is deleted only once nothing else
/// references the repository.
pub async fn delete_repo_hook(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(params): Path<RepoPathParams>,
    Json(target): Json<HookTarget>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let manager = hook_manager(&state)?;
    manager
        .delete(
            &params.owner,
            &params.repo,
            &ObjectMeta::new(target.namespace, target.name),
        )
        .await
        .map_err(|e| match e {
            Error::NotFound => ApiError::not_found("Deployment not found"),
            other => ApiError::from(other),
        })?;
    Ok(Json(ApiResponse::success(())))
}

/// DELETE /github/repos/{owner}/{repo}/hooks/{id}, bypassing association
/// bookkeeping.
pub async fn delete_repo_hook_by_id(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((owner, repo, id)): Path<(String, String, u64)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.github.delete_hook(&owner, &repo, id).await?;
    Ok(Json(ApiResponse::success(())))
}

/// GET /github/orgs/{org}/repos
pub async fn org_repos(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org): Path<String>,
) -> Result<Json<ApiResponse<Vec<RepoSummary>>>, ApiError> {
    let repos = state.github.org_repos(&org).await?;
    Ok(Json(ApiResponse::success(repos)))
}

/// GET /github/user/repos
pub async fn user_repos(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<RepoSummary>>>, ApiError> {
    let repos = state.github.user_repos().await?;
    Ok(Json(ApiResponse::success(repos)))
}

/// GET /github/search/repos?q=
pub async fn search_repos(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<RepoSearchPage>>, ApiError> {
    let page = state.github.search_repos(&query.q).await?;
    Ok(Json(ApiResponse::success(page)))
}
