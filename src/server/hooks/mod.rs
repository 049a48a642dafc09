use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use crate::server::AppState;

pub mod dispatch;
mod handlers;

/// Webhook receiver plus the internal build-record endpoint, merged at the
/// router root.
pub fn hooks_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/hooks",
            post(handlers::receive_hook).get(handlers::liveness),
        )
        .route("/hooks/build", post(handlers::record_build))
}
