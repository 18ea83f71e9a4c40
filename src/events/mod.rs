//! Event Log
//!
//! Append-only log of timestamped, typed events emitted by the website's
//! instrumentation. Each event carries a free-form JSON property bag.
//!
//! ## Components
//!
//! - [`EventRow`]: raw row shape as stored (`type`, `properties`, `created_at`)
//! - [`BehaviorEvent`]: typed view of the rows relevant to segmentation,
//!   validated at the read boundary
//! - [`EventStore`]: query seam used by the behavior classifier
//! - [`SqliteEventStore`]: SQLite-backed implementation

mod error;
mod store;
mod types;

pub use error::{EventStoreError, EventStoreResult};
pub use store::{EventStore, SqliteEventStore};
pub use types::{BehaviorEvent, EventRow, EventType};
