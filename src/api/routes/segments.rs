//! Segment Routes
//!
//! - POST /api/v1/segments - Classify a batch of patients

use axum::{extract::State, Json};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use crate::api::dto::{SegmentsRequest, SegmentsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Maximum candidates per request
const MAX_CANDIDATES: usize = 10_000;

/// POST /api/v1/segments
///
/// Classification never fails: a store error or an empty window yields an
/// empty map, which callers treat as "no signal".
pub async fn classify_segments(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SegmentsRequest>,
) -> ApiResult<Json<SegmentsResponse>> {
    if req.candidates.len() > MAX_CANDIDATES {
        return Err(ApiError::Validation(format!(
            "Candidate count exceeds maximum of {}",
            MAX_CANDIDATES
        )));
    }

    let since = resolve_since(&req, state.config.api.default_segment_window_days)?;
    let segments = state.classifier.classify(&req.candidates, since).await;

    tracing::debug!(
        candidates = req.candidates.len(),
        classified = segments.len(),
        since = %since,
        "Classified segments"
    );

    Ok(Json(SegmentsResponse { segments }))
}

/// Window start: explicit `since`, else `days` back, else the configured default
fn resolve_since(req: &SegmentsRequest, default_days: i64) -> ApiResult<DateTime<Utc>> {
    if let Some(ms) = req.since {
        return Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ApiError::Validation(format!("Invalid since: {}", ms)));
    }

    let days = req.days.unwrap_or(default_days);
    if !(1..=3650).contains(&days) {
        return Err(ApiError::Validation(
            "days must be between 1 and 3650".to_string(),
        ));
    }

    Ok(Utc::now() - Duration::days(days))
}
