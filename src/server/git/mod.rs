mod auth;
mod handlers;
pub mod pktline;
mod process;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::server::AppState;

/// Push packfiles routinely exceed the default axum body cap.
const MAX_PACK_SIZE: usize = 1024 * 1024 * 1024;

pub fn git_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{namespace}/{app}/info/refs", get(handlers::info_refs))
        .route(
            "/{namespace}/{app}/git-upload-pack",
            post(handlers::git_upload_pack),
        )
        .route(
            "/{namespace}/{app}/git-receive-pack",
            post(handlers::git_receive_pack),
        )
        // Everything else at the root belongs to the protocol surface.
        .fallback(handlers::path_rejected)
        .layer(DefaultBodyLimit::max(MAX_PACK_SIZE))
}
