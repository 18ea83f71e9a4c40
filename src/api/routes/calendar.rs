//! Calendar Routes
//!
//! - POST /api/v1/calendar/invite - Render a booking invite as `.ics`

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::error::{ApiError, ApiResult};
use crate::calendar::CalendarInvite;

/// POST /api/v1/calendar/invite
pub async fn render_invite(Json(invite): Json<CalendarInvite>) -> ApiResult<Response> {
    if invite.uid.trim().is_empty() {
        return Err(ApiError::Validation("uid cannot be empty".to_string()));
    }
    if invite.end <= invite.start {
        return Err(ApiError::Validation("end must be after start".to_string()));
    }

    let body = invite.to_ics();

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8; method=REQUEST"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"invite.ics\""),
        ],
        body,
    )
        .into_response())
}
