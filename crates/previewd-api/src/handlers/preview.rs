//! Derivative endpoints: synchronous fetch, asynchronous warm-up, job
//! status, and model companion blobs.
//!
//! Route shape is `/preview/{kind}/{user}/{*path}` where `path` is the
//! file location relative to the user's file root. Passing `?share=TOKEN`
//! keys the derivative to the share instead of the user.

use std::path::PathBuf;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use serde::Deserialize;

use previewd_core::error::AppError;
use previewd_engine::cache::Artifact;
use previewd_engine::jobs::JobRecord;
use previewd_engine::{CacheScope, DerivativeKind, DerivativeRequest, PreviewParams};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for synchronous derivative requests.
#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    /// Bounding box width override.
    pub w: Option<u32>,
    /// Bounding box height override.
    pub h: Option<u32>,
    /// JPEG quality override.
    pub q: Option<u8>,
    /// Share token; when present the derivative is keyed to the share.
    pub share: Option<String>,
}

/// Query parameters for warm-up requests.
#[derive(Debug, Default, Deserialize)]
pub struct WarmQuery {
    /// Derivative kind: `thumb` (default), `image`, or `model`.
    pub kind: Option<String>,
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub q: Option<u8>,
    pub share: Option<String>,
}

/// GET /api/preview/thumb/{user}/{*path}
pub async fn thumbnail(
    State(state): State<AppState>,
    Path((user, path)): Path<(String, String)>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    let req = build_request(&state, user, &path, DerivativeKind::Thumbnail, query)?;
    let artifact = state.coordinator.get_derivative(&req).await?;
    serve_artifact(artifact)
}

/// GET /api/preview/image/{user}/{*path}
pub async fn optimized_image(
    State(state): State<AppState>,
    Path((user, path)): Path<(String, String)>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    let req = build_request(&state, user, &path, DerivativeKind::OptimizedImage, query)?;
    let artifact = state.coordinator.get_derivative(&req).await?;
    serve_artifact(artifact)
}

/// GET /api/preview/model/{user}/{*path}
pub async fn web_model(
    State(state): State<AppState>,
    Path((user, path)): Path<(String, String)>,
    Query(query): Query<PreviewQuery>,
) -> Result<Response, ApiError> {
    let req = build_request(&state, user, &path, DerivativeKind::WebModel, query)?;
    let artifact = state.coordinator.get_derivative(&req).await?;
    serve_artifact(artifact)
}

/// POST /api/preview/warm/{user}/{*path}?kind=thumb|image|model
///
/// Accepts the conversion and returns 202 with a job record immediately.
/// Poll `/api/preview/jobs/{key}` for the terminal state.
pub async fn warm(
    State(state): State<AppState>,
    Path((user, path)): Path<(String, String)>,
    Query(query): Query<WarmQuery>,
) -> Result<(StatusCode, Json<JobRecord>), ApiError> {
    let kind = match query.kind.as_deref() {
        None | Some("thumb") | Some("thumbnail") => DerivativeKind::Thumbnail,
        Some("image") => DerivativeKind::OptimizedImage,
        Some("model") => DerivativeKind::WebModel,
        Some(other) => {
            return Err(AppError::validation(format!("Unknown derivative kind '{other}'")).into());
        }
    };
    let preview = PreviewQuery {
        w: query.w,
        h: query.h,
        q: query.q,
        share: query.share,
    };
    let req = build_request(&state, user, &path, kind, preview)?;
    let record = state.coordinator.enqueue(req);
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// GET /api/preview/jobs/{key}
pub async fn job_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    let record = state
        .coordinator
        .job(&key)
        .ok_or_else(|| AppError::not_found(format!("No job for key '{key}'")))?;
    Ok(Json(record))
}

/// GET /api/preview/blob/{name}
///
/// Serves a glTF external buffer referenced by a rewritten scene.
pub async fn model_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if name.contains("..") || name.contains('/') {
        return Err(AppError::validation("Invalid blob name").into());
    }
    let artifact = state
        .coordinator
        .blob(&name)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No blob named '{name}'")))?;
    serve_artifact(artifact)
}

/// Build a derivative request from route/query input, rejecting path
/// traversal before anything touches the filesystem.
fn build_request(
    state: &AppState,
    user: String,
    path: &str,
    kind: DerivativeKind,
    query: PreviewQuery,
) -> Result<DerivativeRequest, AppError> {
    if !state.config.preview.enabled {
        return Err(AppError::service_unavailable(
            "Derivative generation is disabled",
        ));
    }
    validate_segment(&user)?;
    let (rel_path, file_name) = split_target(path)?;

    let source_path = PathBuf::from(&state.config.storage.files_root)
        .join(&user)
        .join(path.trim_start_matches('/'));

    let scope = match query.share {
        Some(token) => CacheScope::Share(token),
        None => CacheScope::User(user),
    };

    let preview = &state.config.preview;
    let (quality, max_width, max_height) = match kind {
        DerivativeKind::Thumbnail | DerivativeKind::WebModel => (
            preview.thumbnail_quality,
            preview.thumbnail_max_width,
            preview.thumbnail_max_height,
        ),
        DerivativeKind::OptimizedImage => (
            preview.image_quality,
            preview.image_max_width,
            preview.image_max_height,
        ),
    };
    let params = PreviewParams {
        quality: query.q.unwrap_or(quality),
        max_width: query.w.unwrap_or(max_width),
        max_height: query.h.unwrap_or(max_height),
    }
    .clamped();

    Ok(DerivativeRequest {
        source_path,
        scope,
        rel_path,
        file_name,
        kind,
        params,
    })
}

/// Split a request path into `(rel_path, file_name)`, rejecting traversal
/// and empty segments.
fn split_target(path: &str) -> Result<(String, String), AppError> {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(AppError::validation("Empty file path"));
    }
    for segment in &segments {
        validate_segment(segment)?;
    }

    let file_name = segments[segments.len() - 1].to_string();
    let rel_path = segments[..segments.len() - 1].join("/");
    Ok((rel_path, file_name))
}

fn validate_segment(segment: &str) -> Result<(), AppError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
        return Err(AppError::validation("Invalid path segment"));
    }
    Ok(())
}

fn serve_artifact(artifact: Artifact) -> Result<Response, ApiError> {
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.content_type)
        .header(header::CONTENT_LENGTH, artifact.data.len())
        .header(
            header::CACHE_CONTROL,
            "public, max-age=31536000, immutable",
        )
        .body(Body::from(artifact.data))
        .map_err(|e| AppError::internal(format!("Response build failed: {e}")))?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_paths() {
        let (rel, name) = split_target("docs/img/photo.heic").expect("split");
        assert_eq!(rel, "docs/img");
        assert_eq!(name, "photo.heic");

        let (rel, name) = split_target("photo.heic").expect("split");
        assert_eq!(rel, "");
        assert_eq!(name, "photo.heic");
    }

    #[test]
    fn rejects_traversal() {
        assert!(split_target("../etc/passwd").is_err());
        assert!(split_target("docs/../../secret.png").is_err());
        assert!(split_target("").is_err());
        assert!(split_target("///").is_err());
    }
}
