//! # Outreach
//!
//! Patient engagement tooling for a therapist matching service: classifies
//! patients by how they interacted with their matches and sends the
//! follow-up emails that go with each segment.
//!
//! ## Modules
//!
//! - [`events`]: Behavior event store (SQLite)
//! - [`behavior`]: Segment classifier
//! - [`email`]: Email provider client with retries and idempotency
//! - [`calendar`]: iCalendar invites
//! - [`booking`]: Booking confirmation emails with the invite attached
//! - [`followup`]: Segment-driven follow-up job
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outreach::{BehaviorClassifier, SqliteEventStore};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteEventStore::open_in_memory()?);
//!     let classifier = BehaviorClassifier::new(store);
//!
//!     let mut candidates = HashMap::new();
//!     candidates.insert("secure-uuid".to_string(), "patient-1".to_string());
//!
//!     let since = chrono::Utc::now() - chrono::Duration::days(30);
//!     let segments = classifier.classify(&candidates, since).await;
//!
//!     for (patient, segment) in &segments {
//!         println!("{}: {}", patient, segment.name());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod behavior;
pub mod booking;
pub mod calendar;
pub mod config;
pub mod email;
pub mod events;
pub mod followup;

// Re-export top-level types for convenience
pub use events::{
    BehaviorEvent, EventRow, EventStore, EventStoreError, EventStoreResult, EventType,
    SqliteEventStore,
};

pub use behavior::{
    classify_events, is_primary_interview_rejection, BehaviorClassifier, BehaviorSegment,
    RejectionReason,
};

pub use email::{
    idempotency_key, Attachment, EmailClient, EmailContext, EmailError, EmailMessage,
    EmailResult, HtmlToText, ImageProxy, RetryPolicy, SendOutcome, SkipReason,
};

pub use calendar::CalendarInvite;

pub use booking::BookingConfirmation;

pub use followup::{Candidate, FollowupJob, FollowupReport, FollowupVariant};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig};
