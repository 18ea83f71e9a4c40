//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::behavior::BehaviorClassifier;
use crate::config::Config;
use crate::events::EventStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Behavior event log
    pub events: Arc<dyn EventStore>,
    /// Segment classifier over `events`
    pub classifier: Arc<BehaviorClassifier>,
    /// Full service configuration
    pub config: Arc<Config>,
    /// HTTP client for the image proxy upstream
    pub http: reqwest::Client,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(events: Arc<dyn EventStore>, config: Config) -> Self {
        let classifier =
            BehaviorClassifier::new(Arc::clone(&events)).max_rows(config.events.max_rows);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.email.timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            events,
            classifier: Arc::new(classifier),
            config: Arc::new(config),
            http,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
