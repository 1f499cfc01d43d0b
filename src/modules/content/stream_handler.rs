//! Read-only artifact endpoints. Every request is resolved against the
//! filesystem; the recorded asset status is not consulted, so an artifact is
//! served as soon as it exists.

use std::path::Path as FsPath;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mime::Mime;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::model::AssetId;
use crate::common::error::AppError;
use crate::common::response::ApiError;
use crate::state::AppState;

const MANIFEST_MIME: &str = "application/vnd.apple.mpegurl";
const SEGMENT_MIME: &str = "video/mp2t";
const MASTER: &str = "master";

/// HLS manifest for one rendition, or the master playlist when
/// `resolution` is `master`.
#[utoipa::path(
    get,
    path = "/videos/{id}/{resolution}/manifest",
    params(
        ("id" = i64, Path, description = "Video ID"),
        ("resolution" = String, Path, description = "Rendition label, or `master`")
    ),
    responses(
        (status = 200, description = "HLS playlist", content_type = "application/vnd.apple.mpegurl"),
        (status = 404, description = "Video or manifest not found")
    ),
    tag = "Streaming"
)]
pub async fn get_manifest(
    State(state): State<AppState>,
    Path((id, resolution)): Path<(AssetId, String)>,
    request: Request,
) -> Response {
    if let Err(e) = ensure_asset(&state, id).await {
        return e.into_response();
    }

    let (dir, path) = if resolution == MASTER {
        (state.store.asset_dir(id), state.store.master_manifest(id))
    } else if state.config.renditions.get(&resolution).is_some() {
        (
            state.store.rendition_dir(id, &resolution),
            state.store.rendition_manifest(id, &resolution),
        )
    } else {
        return ApiError::not_found("Manifest").into_response();
    };

    serve_artifact(&state, &dir, &path, media_type(MANIFEST_MIME), request, "Manifest").await
}

/// One media segment of a rendition.
#[utoipa::path(
    get,
    path = "/videos/{id}/{resolution}/{segment}",
    params(
        ("id" = i64, Path, description = "Video ID"),
        ("resolution" = String, Path, description = "Rendition label"),
        ("segment" = String, Path, description = "Segment file name, e.g. 000.ts")
    ),
    responses(
        (status = 200, description = "MPEG-TS segment", content_type = "video/mp2t"),
        (status = 206, description = "Partial Content"),
        (status = 404, description = "Video or segment not found")
    ),
    tag = "Streaming"
)]
pub async fn get_segment(
    State(state): State<AppState>,
    Path((id, resolution, segment)): Path<(AssetId, String, String)>,
    request: Request,
) -> Response {
    if let Err(e) = ensure_asset(&state, id).await {
        return e.into_response();
    }

    if state.config.renditions.get(&resolution).is_none() {
        return ApiError::not_found("Segment").into_response();
    }
    let Some(path) = state.store.segment_path(id, &resolution, &segment) else {
        tracing::warn!(asset_id = id, segment = %segment, "Rejected segment name");
        return ApiError::not_found("Segment").into_response();
    };

    let dir = state.store.rendition_dir(id, &resolution);
    serve_artifact(&state, &dir, &path, media_type(SEGMENT_MIME), request, "Segment").await
}

#[utoipa::path(
    get,
    path = "/videos/{id}/thumbnail",
    params(
        ("id" = i64, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Thumbnail image", content_type = "image/jpeg"),
        (status = 404, description = "Video or thumbnail not found")
    ),
    tag = "Streaming"
)]
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<AssetId>,
    request: Request,
) -> Response {
    if let Err(e) = ensure_asset(&state, id).await {
        return e.into_response();
    }

    let path = state.store.thumbnail_path(id);
    let dir = state.store.root().to_path_buf();
    serve_artifact(&state, &dir, &path, mime::IMAGE_JPEG, request, "Thumbnail").await
}

fn media_type(essence: &str) -> Mime {
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

async fn ensure_asset(state: &AppState, id: AssetId) -> Result<(), AppError> {
    match state.assets.get(id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Video".to_string())),
    }
}

/// Streams `path` with range support if it is a regular file inside `dir`.
async fn serve_artifact(
    state: &AppState,
    dir: &FsPath,
    path: &FsPath,
    mime: Mime,
    request: Request,
    what: &str,
) -> Response {
    let Some(file) = state.store.existing_file_within(dir, path).await else {
        return ApiError::not_found(what).into_response();
    };

    match ServeFile::new_with_mime(file, &mime)
        .oneshot(request)
        .await
    {
        Ok(response) => response.map(Body::new).into_response(),
        Err(e) => {
            tracing::error!("Failed to serve {}: {}", what, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
