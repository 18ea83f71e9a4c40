//! Image Proxy Route
//!
//! Serves therapist profile photos from the site's own domain. Outgoing
//! emails point here (see [`crate::email::ImageProxy`]); this handler fetches
//! the object from public storage and streams it back.
//!
//! - GET {image_proxy_path}/*path

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

const CACHE_CONTROL: &str = "public, max-age=86400";

/// GET {image_proxy_path}/*path
pub async fn proxy_image(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    let segments = validate_path(&path)?;

    let public_url = state
        .config
        .storage
        .public_url
        .as_deref()
        .map(|u| u.trim_end_matches('/'))
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::NotFound("image storage is not configured".to_string()))?;

    let upstream = upstream_url(public_url, &state.config.storage.profile_bucket, &segments);

    let response = state.http.get(&upstream).send().await.map_err(|e| {
        tracing::warn!(url = %upstream, error = %e, "Image fetch failed");
        ApiError::Upstream(format!("image fetch failed: {}", e))
    })?;

    let status = response.status().as_u16();
    if status == 404 || status == 400 {
        return Err(ApiError::NotFound(format!("image {}", path)));
    }
    if !(200..300).contains(&status) {
        return Err(ApiError::Upstream(format!("storage returned {}", status)));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Upstream(format!("image read failed: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Split an object path, rejecting traversal and empty segments
fn validate_path(path: &str) -> ApiResult<Vec<&str>> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(ApiError::Validation(format!("invalid image path: {}", path)));
    }

    Ok(segments)
}

fn upstream_url(public_url: &str, bucket: &str, segments: &[&str]) -> String {
    let encoded: Vec<String> = segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();

    format!(
        "{}/{}/{}",
        public_url,
        bucket.trim_matches('/'),
        encoded.join("/")
    )
}
