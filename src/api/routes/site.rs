//! Site Routes
//!
//! - GET /api/v1/site - Public site flags

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::SiteResponse;
use crate::api::state::AppState;

/// GET /api/v1/site
pub async fn site_flags(State(state): State<Arc<AppState>>) -> Json<SiteResponse> {
    Json(SiteResponse {
        base_url: state.config.site.base().to_string(),
        cookie_consent: state.config.site.cookie_consent,
    })
}
