//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use crate::behavior::BehaviorSegment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================
// EVENT DTOs
// ============================================

/// Record-event request
#[derive(Debug, Deserialize)]
pub struct RecordEventRequest {
    /// Event type, e.g. `match_page_view`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Property bag
    #[serde(default)]
    pub properties: Option<Value>,
    /// Optional timestamp (ms since epoch), defaults to now
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Record-event response
#[derive(Debug, Serialize)]
pub struct RecordEventResponse {
    pub status: String,
    pub id: i64,
    /// Stored timestamp (ms since epoch)
    pub created_at: i64,
}

// ============================================
// SEGMENT DTOs
// ============================================

/// Classification request
#[derive(Debug, Deserialize)]
pub struct SegmentsRequest {
    /// Secure token -> patient id
    pub candidates: HashMap<String, String>,
    /// Window start (ms since epoch); wins over `days`
    #[serde(default)]
    pub since: Option<i64>,
    /// Window length in days
    #[serde(default)]
    pub days: Option<i64>,
}

/// Classification response, keyed by patient id
#[derive(Debug, Serialize)]
pub struct SegmentsResponse {
    pub segments: HashMap<String, BehaviorSegment>,
}

// ============================================
// SITE DTOs
// ============================================

/// Public site flags
#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub base_url: String,
    pub cookie_consent: bool,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// healthy, degraded or unhealthy
    pub status: String,
    /// Event store status
    pub events: String,
    /// Email provider configured
    pub email: String,
    pub uptime_seconds: u64,
    pub version: String,
}
