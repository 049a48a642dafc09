use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::server::AppState;

mod handlers;
pub mod manager;

/// Routes nested under `/github`: hook lifecycle plus thin repo listing
/// proxies, all requiring a user token.
pub fn github_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/repos/{owner}/{repo}/hooks",
            post(handlers::create_repo_hook)
                .get(handlers::list_repo_hooks)
                .delete(handlers::delete_repo_hook),
        )
        .route(
            "/repos/{owner}/{repo}/hooks/{id}",
            delete(handlers::delete_repo_hook_by_id),
        )
        .route("/orgs/{org}/repos", get(handlers::org_repos))
        .route("/user/repos", get(handlers::user_repos))
        .route("/search/repos", get(handlers::search_repos))
}
