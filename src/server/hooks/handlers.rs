use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::server::AppState;
use crate::server::hooks::dispatch::Dispatcher;
use crate::server::response::{ApiError, ApiResponse};
use crate::types::{GitInfo, HeadCommit, ObjectMeta};

type HmacSha256 = Hmac<Sha256>;

const ZERO_REV: &str = "0000000000000000000000000000000000000000";

fn valid_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    let Some(header) = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(sig_hex) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

/// POST /hooks, the GitHub webhook receiver. Signature first, then event
/// dispatch by the `X-GitHub-Event` header.
pub async fn receive_hook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(secret) = state.config.github.webhook_secret.as_deref() else {
        warn!("webhook rejected: no webhook secret configured");
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    };
    if !valid_signature(&headers, &body, secret) {
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    }

    let event = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing event type"))?;

    match event {
        "ping" => {
            let ping: crate::github::PingEvent = serde_json::from_slice(&body)
                .map_err(|e| ApiError::bad_request(format!("Malformed ping payload: {e}")))?;
            debug!(hook_id = ?ping.hook_id, "webhook ping");
            Ok(Json(ApiResponse::success(ping.zen)).into_response())
        }
        "push" => {
            let push: crate::github::PushEvent = serde_json::from_slice(&body)
                .map_err(|e| ApiError::bad_request(format!("Malformed push payload: {e}")))?;
            let dispatcher = Dispatcher::new(
                state.store.clone(),
                state.orchestrator.clone(),
                state.identity.clone(),
                state.tokens.clone(),
            );
            let triggered = dispatcher.handle_push(&push).await?;
            Ok(Json(ApiResponse::success(triggered)).into_response())
        }
        other => Err(ApiError::bad_request(format!(
            "Unsupported event type: {other}"
        ))),
    }
}

/// GET /hooks, receiver liveness.
pub async fn liveness() -> &'static str {
    "OK"
}

/// What the update hook reports after a ref update: the standard
/// `update <refname> <oldrev> <newrev>` triple plus the repo identity.
#[derive(Debug, Deserialize)]
pub struct BuildReport {
    pub namespace: String,
    pub app: String,
    pub refname: String,
    pub oldrev: String,
    pub newrev: String,
}

/// POST /hooks/build, called by the receive-hook subcommand from inside
/// `git receive-pack`. Records the pushed revision; a revision already
/// recorded answers Conflict, which the hook treats as success.
pub async fn record_build(
    State(state): State<Arc<AppState>>,
    Json(report): Json<BuildReport>,
) -> Result<Json<ApiResponse<GitInfo>>, ApiError> {
    debug!(
        namespace = %report.namespace,
        app = %report.app,
        refname = %report.refname,
        oldrev = %report.oldrev,
        newrev = %report.newrev,
        "build report received"
    );

    let branch = report
        .refname
        .strip_prefix("refs/heads/")
        .ok_or_else(|| ApiError::bad_request("Not a branch ref"))?;
    if report.newrev == ZERO_REV {
        return Err(ApiError::bad_request("Ref deletion is not a build"));
    }

    let meta = ObjectMeta::new(&report.namespace, &report.app);
    let record = GitInfo {
        name: report.app.clone(),
        namespace: report.namespace.clone(),
        kube_ref: meta.qualified(),
        git_branch: branch.to_string(),
        source_type: "push".to_string(),
        head_commit: HeadCommit {
            id: report.newrev.clone(),
            ..HeadCommit::default()
        },
        files: Default::default(),
        status: "pending".to_string(),
        created_at: chrono::Utc::now(),
    };

    let stored = state
        .store
        .create(&report.namespace, &report.app, &report.newrev, &record)?;
    Ok(Json(ApiResponse::success(stored)))
}
