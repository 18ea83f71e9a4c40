//! Behavior segment types

use serde::{Deserialize, Serialize};

/// Rejection reasons that warrant a personal follow-up
const PRIMARY_REJECTION_REASONS: [&str; 3] = ["method_wrong", "too_expensive", "wants_insurance"];

/// One rejected therapist proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReason {
    pub reason: String,
    pub therapist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Engagement state of a single patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "segment", rename_all = "snake_case")]
pub enum BehaviorSegment {
    /// No relevant events
    NeverVisited,
    /// Only viewed the match page
    VisitedNoAction {
        #[serde(rename = "visitCount")]
        visit_count: u32,
    },
    /// Rejected at least one proposal; rejections in newest-first order
    Rejected { reasons: Vec<RejectionReason> },
    /// Opened the contact form but never sent a message
    AlmostBooked { therapist_id: String },
    /// Sent a message to a therapist
    Contacted,
}

impl BehaviorSegment {
    /// Segment tag as used in logs and templates
    pub fn name(&self) -> &'static str {
        match self {
            BehaviorSegment::NeverVisited => "never_visited",
            BehaviorSegment::VisitedNoAction { .. } => "visited_no_action",
            BehaviorSegment::Rejected { .. } => "rejected",
            BehaviorSegment::AlmostBooked { .. } => "almost_booked",
            BehaviorSegment::Contacted => "contacted",
        }
    }
}

/// Whether a rejection should be routed to personal outreach.
///
/// Only the first (most recent) reason counts.
pub fn is_primary_interview_rejection(segment: &BehaviorSegment) -> bool {
    match segment {
        BehaviorSegment::Rejected { reasons } => reasons
            .first()
            .map(|r| PRIMARY_REJECTION_REASONS.contains(&r.reason.as_str()))
            .unwrap_or(false),
        _ => false,
    }
}
