//! Patient Behavior Segmentation
//!
//! Reduces the event log to one engagement segment per patient so the
//! follow-up job can pick an email variant.
//!
//! ## Priority
//!
//! ```text
//! contacted > almost_booked > rejected > visited_no_action > never_visited
//! ```
//!
//! Classification never fails: a store error or an empty result yields an
//! empty map, and the caller falls back to its generic template.

mod classifier;
mod segment;

pub use classifier::{classify_events, BehaviorClassifier};
pub use segment::{is_primary_interview_rejection, BehaviorSegment, RejectionReason};
