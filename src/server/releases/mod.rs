mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

/// Release artifacts are whole app slugs; the default body cap is far too
/// small for them.
const MAX_UPLOAD_SIZE: usize = 1024 * 1024 * 1024;

pub fn releases_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{namespace}/{app}", get(handlers::list_releases))
        .route(
            "/{namespace}/{app}/{revision}",
            post(handlers::upload_release)
                .get(handlers::get_release)
                .patch(handlers::patch_release),
        )
        .route(
            "/{namespace}/{app}/{revision}/{file}",
            get(handlers::download_artifact),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
}
