use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};
use crate::store::SeekAttr;
use crate::types::{GitInfo, ObjectMeta, ReleasePatch};

#[derive(Deserialize)]
pub struct ReleasePathParams {
    namespace: String,
    app: String,
    revision: String,
}

#[derive(Deserialize)]
pub struct ArtifactPathParams {
    namespace: String,
    app: String,
    revision: String,
    file: String,
}

#[derive(Deserialize)]
pub struct ReleaseQuery {
    source: Option<String>,
    kube_ref: Option<String>,
    status: Option<String>,
}

fn valid_path_segment(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Namespace, app and revision all become directory components under the
/// releases root, so each one is held to the same rules as a file name.
/// Percent-encoded dots arrive decoded here.
fn check_release_path(segments: &[&str]) -> Result<(), ApiError> {
    for segment in segments {
        if !valid_path_segment(segment) {
            return Err(ApiError::bad_request(format!(
                "Invalid path segment: {segment}"
            )));
        }
    }
    Ok(())
}

/// POST /releases/{namespace}/{app}/{revision}
///
/// Attaches multipart file fields to an existing release record. The record
/// is created by the push or webhook path first; uploading against a missing
/// record is 404, re-uploading a filename already recorded is 409 and nothing
/// is written for it.
pub async fn upload_release(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(params): Path<ReleasePathParams>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<GitInfo>>, ApiError> {
    check_release_path(&[&params.namespace, &params.app, &params.revision])?;
    let record = state
        .store
        .get(&params.namespace, &params.app, &params.revision)?
        .ok_or_else(|| ApiError::not_found("Release not found"))?;

    let meta = ObjectMeta::new(&params.namespace, &params.app);
    let dir = state.repos.release_path(&meta, &params.revision);

    let mut uploaded: BTreeMap<String, u64> = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {e}")))?
    {
        let name = field
            .file_name()
            .map(str::to_string)
            .or_else(|| field.name().map(str::to_string))
            .ok_or_else(|| ApiError::bad_request("File field must be named"))?;

        if !valid_path_segment(&name) {
            return Err(ApiError::bad_request(format!("Invalid file name: {name}")));
        }
        if record.files.contains_key(&name) || uploaded.contains_key(&name) {
            return Err(ApiError::conflict(format!("File already uploaded: {name}")));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        fs::create_dir_all(&dir).await.map_err(|e| {
            warn!(error = %e, release = %params.revision, "release dir creation failed");
            ApiError::internal("Failed to store artifact")
        })?;
        fs::write(dir.join(&name), &data).await.map_err(|e| {
            warn!(error = %e, file = %name, "artifact write failed");
            ApiError::internal("Failed to store artifact")
        })?;

        uploaded.insert(name, data.len() as u64);
    }

    if uploaded.is_empty() {
        return Err(ApiError::bad_request("No file fields in upload"));
    }

    let patch = ReleasePatch {
        files: uploaded,
        status: None,
    };
    let updated = state
        .store
        .update(&params.namespace, &params.app, &params.revision, &patch)?;

    Ok(Json(ApiResponse::success(updated)))
}

/// GET /releases/{namespace}/{app}/{revision}/{file}
pub async fn download_artifact(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(params): Path<ArtifactPathParams>,
) -> Response {
    if let Err(e) = check_release_path(&[&params.namespace, &params.app, &params.revision]) {
        return e.into_response();
    }
    if !valid_path_segment(&params.file) {
        return ApiError::bad_request("Invalid file name").into_response();
    }

    let meta = ObjectMeta::new(&params.namespace, &params.app);
    let path = state
        .repos
        .release_path(&meta, &params.revision)
        .join(&params.file);

    let file = match fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ApiError::not_found("Artifact not found").into_response();
        }
        Err(e) => {
            warn!(error = %e, file = %params.file, "artifact open failed");
            return ApiError::internal("Failed to read artifact").into_response();
        }
    };

    let size = match file.metadata().await {
        Ok(m) => m.len(),
        Err(e) => {
            warn!(error = %e, file = %params.file, "artifact stat failed");
            return ApiError::internal("Failed to read artifact").into_response();
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// GET /releases/{namespace}/{app}/{revision}
pub async fn get_release(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(params): Path<ReleasePathParams>,
) -> Result<Json<ApiResponse<GitInfo>>, ApiError> {
    check_release_path(&[&params.namespace, &params.app, &params.revision])?;
    let record = state
        .store
        .get(&params.namespace, &params.app, &params.revision)?
        .ok_or_else(|| ApiError::not_found("Release not found"))?;
    Ok(Json(ApiResponse::success(record)))
}

/// GET /releases/{namespace}/{app}
///
/// Unfiltered listing is bounded by the store; exactly one of the filter
/// parameters switches to an attribute scan.
pub async fn list_releases(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((namespace, app)): Path<(String, String)>,
    Query(query): Query<ReleaseQuery>,
) -> Result<Json<ApiResponse<Vec<GitInfo>>>, ApiError> {
    check_release_path(&[&namespace, &app])?;
    let filters = [
        (SeekAttr::Source, &query.source),
        (SeekAttr::KubeRef, &query.kube_ref),
        (SeekAttr::Status, &query.status),
    ];

    let mut selected = filters.iter().filter_map(|(attr, value)| {
        value.as_deref().map(|v| (*attr, v))
    });

    let records = match (selected.next(), selected.next()) {
        (None, _) => state.store.list(&namespace, &app)?,
        (Some((attr, value)), None) => state.store.seek(&namespace, &app, attr, value)?,
        (Some(_), Some(_)) => {
            return Err(ApiError::bad_request("Only one filter may be given"));
        }
    };

    Ok(Json(ApiResponse::success(records)))
}

/// PATCH /releases/{namespace}/{app}/{revision}
///
/// Merge semantics only: `files` entries accumulate and `status` replaces.
/// The head commit is immutable once recorded.
pub async fn patch_release(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(params): Path<ReleasePathParams>,
    Json(patch): Json<ReleasePatch>,
) -> Result<Json<ApiResponse<GitInfo>>, ApiError> {
    check_release_path(&[&params.namespace, &params.app, &params.revision])?;
    let updated = state
        .store
        .update(&params.namespace, &params.app, &params.revision, &patch)?;
    Ok(Json(ApiResponse::success(updated)))
}
