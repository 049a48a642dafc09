use std::sync::Arc;

use async_compression::tokio::bufread::GzipDecoder;
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::auth::{GitAuthError, authenticate_git};
use super::pktline::announce_header;
use super::process::{GitService, GitStream, feed_stdin, spawn_git};
use crate::server::AppState;
use crate::types::{GitEnv, ObjectMeta};

#[derive(Deserialize)]
pub struct InfoRefsQuery {
    service: Option<String>,
}

#[derive(Deserialize)]
pub struct GitPathParams {
    namespace: String,
    app: String,
}

struct GitContext {
    meta: ObjectMeta,
    repo_path: std::path::PathBuf,
    env: GitEnv,
}

fn git_error_response(err: GitAuthError) -> Response {
    let mut response = (err.status_code(), err.message()).into_response();

    if err.requires_auth_header() {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            "Basic realm=\"slipway\"".parse().unwrap(),
        );
    }

    response
}

/// Fallback for paths that do not split into {namespace}/{app} plus a known
/// protocol suffix. Refused, never reported missing, for the same reason
/// invalid names are: a 404 would let probing map existing apps.
pub async fn path_rejected() -> Response {
    git_error_response(GitAuthError::PathRejected)
}

fn strip_git_suffix(name: &str) -> &str {
    name.strip_suffix(".git").unwrap_or(name)
}

/// Lowercase alphanumeric groups joined by single hyphens, nothing else.
fn valid_app_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 100 {
        return false;
    }
    name.split('-').all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    })
}

/// Both path segments are checked before anything touches the filesystem.
/// Invalid paths get 403, never 404, so probing cannot distinguish a rejected
/// name from a missing app.
async fn resolve_git_context(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    params: &GitPathParams,
) -> Result<GitContext, GitAuthError> {
    let app = strip_git_suffix(&params.app);
    if !valid_app_name(app) || !valid_app_name(&params.namespace) {
        return Err(GitAuthError::PathRejected);
    }

    let principal = authenticate_git(headers, state)?;
    debug!(subject = %principal.subject, namespace = %params.namespace, app, "git request");

    let exists = state
        .orchestrator
        .app_exists(&params.namespace, app)
        .await
        .map_err(|e| {
            warn!(error = %e, "orchestrator app lookup failed");
            GitAuthError::InternalError
        })?;
    if !exists {
        return Err(GitAuthError::AppNotFound);
    }

    let meta = ObjectMeta::new(&params.namespace, app);
    let repo_path = state.repos.ensure(&meta).await.map_err(|e| {
        warn!(error = %e, target = %meta.qualified(), "repository setup failed");
        GitAuthError::InternalError
    })?;
    let env = state.git_env(&meta);

    Ok(GitContext {
        meta,
        repo_path,
        env,
    })
}

fn stream_response(stream: GitStream, content_type: &'static str) -> Response {
    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    response
}

pub async fn info_refs(
    State(state): State<Arc<AppState>>,
    Path(params): Path<GitPathParams>,
    Query(query): Query<InfoRefsQuery>,
    headers: HeaderMap,
) -> Response {
    // The dumb protocol (no service parameter) is not served.
    let service = match query.service.as_deref().and_then(GitService::from_str) {
        Some(s) => s,
        None => return git_error_response(GitAuthError::PathRejected),
    };

    let ctx = match resolve_git_context(&state, &headers, &params).await {
        Ok(ctx) => ctx,
        Err(e) => return git_error_response(e),
    };

    let child = match spawn_git(service, &ctx.repo_path, &ctx.env, true) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, target = %ctx.meta.qualified(), "git spawn failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    let header = announce_header(service.command_name());
    let stream = match GitStream::new(child, Some(header)) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "git stream setup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    stream_response(stream, service.advertisement_content_type())
}

pub async fn git_upload_pack(
    State(state): State<Arc<AppState>>,
    Path(params): Path<GitPathParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    exchange(state, params, headers, body, GitService::UploadPack).await
}

pub async fn git_receive_pack(
    State(state): State<Arc<AppState>>,
    Path(params): Path<GitPathParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    exchange(state, params, headers, body, GitService::ReceivePack).await
}

/// Shared stateless-RPC exchange: body in, stdout streamed back out.
async fn exchange(
    state: Arc<AppState>,
    params: GitPathParams,
    headers: HeaderMap,
    body: Bytes,
    service: GitService,
) -> Response {
    let ctx = match resolve_git_context(&state, &headers, &params).await {
        Ok(ctx) => ctx,
        Err(e) => return git_error_response(e),
    };

    let input = match decompress_if_gzip(&headers, body).await {
        Ok(data) => data,
        Err(e) => return e,
    };

    let mut child = match spawn_git(service, &ctx.repo_path, &ctx.env, false) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, target = %ctx.meta.qualified(), "git spawn failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };
    feed_stdin(&mut child, input);

    let stream = match GitStream::new(child, None) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "git stream setup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response();
        }
    };

    stream_response(stream, service.content_type())
}

async fn decompress_if_gzip(headers: &HeaderMap, body: Bytes) -> Result<Bytes, Response> {
    let content_encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());

    if content_encoding == Some("gzip") {
        let reader = std::io::Cursor::new(body);
        let mut decoder = GzipDecoder::new(tokio::io::BufReader::new(reader));
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid gzip body").into_response())?;

        Ok(decompressed.into())
    } else {
        Ok(body)
    }
}
