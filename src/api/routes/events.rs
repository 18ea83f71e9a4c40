//! Event Routes
//!
//! - POST /api/v1/events - Record a behavior event

use axum::{extract::State, http::StatusCode, Json};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

use crate::api::dto::{RecordEventRequest, RecordEventResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::events::{EventRow, EventType};

/// Maximum length of an event type name
const MAX_TYPE_LEN: usize = 100;

/// POST /api/v1/events
///
/// Unknown event types are stored too; only the classifier ignores them.
pub async fn record_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordEventRequest>,
) -> ApiResult<(StatusCode, Json<RecordEventResponse>)> {
    let event_type = req.event_type.trim();
    if event_type.is_empty() {
        return Err(ApiError::Validation("Event type cannot be empty".to_string()));
    }
    if event_type.len() > MAX_TYPE_LEN {
        return Err(ApiError::Validation(format!(
            "Event type exceeds maximum length of {} characters",
            MAX_TYPE_LEN
        )));
    }

    let created_at = match req.created_at {
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| ApiError::Validation(format!("Invalid created_at: {}", ms)))?,
        None => Utc::now(),
    };

    let row = EventRow {
        event_type: event_type.to_string(),
        properties: req.properties.filter(|p| !p.is_null()),
        created_at,
    };

    let id = state.events.record(&row).await?;

    if EventType::parse(event_type).is_none() {
        tracing::debug!(event_type = %event_type, id, "Recorded non-behavior event");
    }

    Ok((
        StatusCode::CREATED,
        Json(RecordEventResponse {
            status: "ok".to_string(),
            id,
            created_at: created_at.timestamp_millis(),
        }),
    ))
}
