//! Behavior classifier
//!
//! One bounded query, one pass over the rows, one segment per candidate.

use crate::behavior::{BehaviorSegment, RejectionReason};
use crate::events::{BehaviorEvent, EventRow, EventStore, EventType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Default row cap for a classification query
pub const DEFAULT_MAX_ROWS: usize = 5000;

/// Classifies candidate patients from the event log
pub struct BehaviorClassifier {
    store: Arc<dyn EventStore>,
    max_rows: usize,
}

impl BehaviorClassifier {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Builder method: set the row cap
    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Classify candidates from events created at or after `since`.
    ///
    /// `candidates` maps secure token to patient id; the result is keyed by
    /// patient id. An empty candidate set returns immediately without a
    /// query. A failed or empty query returns an empty map.
    pub async fn classify(
        &self,
        candidates: &HashMap<String, String>,
        since: DateTime<Utc>,
    ) -> HashMap<String, BehaviorSegment> {
        if candidates.is_empty() {
            return HashMap::new();
        }

        let rows = match self
            .store
            .query(&EventType::BEHAVIOR, since, self.max_rows)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, candidates = candidates.len(), "Behavior query failed");
                return HashMap::new();
            }
        };

        if rows.is_empty() {
            return HashMap::new();
        }

        if rows.len() >= self.max_rows {
            tracing::debug!(max_rows = self.max_rows, "Behavior query hit row cap");
        }

        classify_events(&rows, candidates)
    }
}

/// Signals accumulated for one patient during the scan
#[derive(Debug, Default)]
struct Signals {
    views: u32,
    rejections: Vec<RejectionReason>,
    modal_therapist: Option<String>,
    message_sent: bool,
}

impl Signals {
    fn observe(&mut self, event: BehaviorEvent) {
        match event {
            BehaviorEvent::MatchPageView { .. } => self.views += 1,
            BehaviorEvent::MatchRejected {
                therapist_id,
                reason,
                details,
                ..
            } => self.rejections.push(RejectionReason {
                reason,
                therapist_id,
                details,
            }),
            BehaviorEvent::ContactModalOpened { therapist_id, .. } => {
                // Rows arrive newest-first, so the first one seen is the latest
                if self.modal_therapist.is_none() {
                    self.modal_therapist = Some(therapist_id);
                }
            }
            BehaviorEvent::ContactMessageSent { .. } => self.message_sent = true,
        }
    }

    fn resolve(self) -> BehaviorSegment {
        if self.message_sent {
            BehaviorSegment::Contacted
        } else if let Some(therapist_id) = self.modal_therapist {
            BehaviorSegment::AlmostBooked { therapist_id }
        } else if !self.rejections.is_empty() {
            BehaviorSegment::Rejected {
                reasons: self.rejections,
            }
        } else if self.views > 0 {
            BehaviorSegment::VisitedNoAction {
                visit_count: self.views,
            }
        } else {
            BehaviorSegment::NeverVisited
        }
    }
}

/// Reduce newest-first `rows` to one segment per candidate patient.
///
/// Rows for tokens outside `candidates`, unrelated types, and malformed
/// property bags are skipped. Every candidate patient gets an entry.
/// Tokens that share a patient id pool their signals.
pub fn classify_events(
    rows: &[EventRow],
    candidates: &HashMap<String, String>,
) -> HashMap<String, BehaviorSegment> {
    let mut by_patient: HashMap<&str, Signals> = candidates
        .values()
        .map(|patient_id| (patient_id.as_str(), Signals::default()))
        .collect();

    for row in rows {
        let Some(event) = BehaviorEvent::from_row(row) else {
            continue;
        };
        let Some(patient_id) = candidates.get(event.secure_uuid()) else {
            continue;
        };
        if let Some(signals) = by_patient.get_mut(patient_id.as_str()) {
            signals.observe(event);
        }
    }

    by_patient
        .into_iter()
        .map(|(patient_id, signals)| (patient_id.to_string(), signals.resolve()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventStoreError, EventStoreResult, SqliteEventStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidates(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(t, p)| (t.to_string(), p.to_string()))
            .collect()
    }

    fn row(event_type: &str, props: serde_json::Value) -> EventRow {
        EventRow::new(event_type, props)
    }

    /// Store that counts queries and can be told to fail
    struct CountingStore {
        queries: AtomicUsize,
        fail: bool,
        rows: Vec<EventRow>,
    }

    impl CountingStore {
        fn with_rows(rows: Vec<EventRow>) -> Self {
            Self {
                queries: AtomicUsize::new(0),
                fail: false,
                rows,
            }
        }

        fn failing() -> Self {
            Self {
                queries: AtomicUsize::new(0),
                fail: true,
                rows: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl EventStore for CountingStore {
        async fn query(
            &self,
            _types: &[EventType],
            _since: DateTime<Utc>,
            limit: usize,
        ) -> EventStoreResult<Vec<EventRow>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EventStoreError::Lock("poisoned".to_string()));
            }
            Ok(self.rows.iter().take(limit).cloned().collect())
        }

        async fn record(&self, _event: &EventRow) -> EventStoreResult<i64> {
            Ok(0)
        }

        async fn health_check(&self) -> EventStoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_visit_count() {
        let rows = vec![
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
        ];
        let result = classify_events(&rows, &candidates(&[("uuid-A", "patient-1")]));

        assert_eq!(result.len(), 1);
        assert_eq!(
            result["patient-1"],
            BehaviorSegment::VisitedNoAction { visit_count: 2 }
        );
    }

    #[test]
    fn test_modal_outranks_rejection() {
        let rows = vec![
            row(
                "contact_modal_opened",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t1"}),
            ),
            row(
                "match_rejected",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t2", "reason": "too_expensive"}),
            ),
        ];
        let result = classify_events(&rows, &candidates(&[("uuid-A", "patient-1")]));

        assert_eq!(
            result["patient-1"],
            BehaviorSegment::AlmostBooked {
                therapist_id: "t1".to_string()
            }
        );
    }

    #[test]
    fn test_message_sent_outranks_everything() {
        let rows = vec![
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
            row(
                "contact_modal_opened",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t1"}),
            ),
            row(
                "match_rejected",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t2", "reason": "method_wrong"}),
            ),
            row("contact_message_sent", json!({"secure_uuid": "uuid-A"})),
        ];
        let result = classify_events(&rows, &candidates(&[("uuid-A", "patient-1")]));

        assert_eq!(result["patient-1"], BehaviorSegment::Contacted);
    }

    #[test]
    fn test_most_recent_modal_wins() {
        // Newest-first: t3 was opened last
        let rows = vec![
            row(
                "contact_modal_opened",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t3"}),
            ),
            row(
                "contact_modal_opened",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t1"}),
            ),
        ];
        let result = classify_events(&rows, &candidates(&[("uuid-A", "patient-1")]));

        assert_eq!(
            result["patient-1"],
            BehaviorSegment::AlmostBooked {
                therapist_id: "t3".to_string()
            }
        );
    }

    #[test]
    fn test_rejections_accumulate_in_scan_order() {
        let rows = vec![
            row(
                "match_rejected",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t2", "reason": "too_expensive"}),
            ),
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
            row(
                "match_rejected",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t1", "reason": "gender", "details": "prefers female"}),
            ),
            // No therapist: malformed, not counted
            row(
                "match_rejected",
                json!({"secure_uuid": "uuid-A", "reason": "other"}),
            ),
        ];
        let result = classify_events(&rows, &candidates(&[("uuid-A", "patient-1")]));

        assert_eq!(
            result["patient-1"],
            BehaviorSegment::Rejected {
                reasons: vec![
                    RejectionReason {
                        reason: "too_expensive".to_string(),
                        therapist_id: "t2".to_string(),
                        details: None,
                    },
                    RejectionReason {
                        reason: "gender".to_string(),
                        therapist_id: "t1".to_string(),
                        details: Some("prefers female".to_string()),
                    },
                ]
            }
        );
    }

    #[test]
    fn test_mapping_is_total_and_isolated() {
        let rows = vec![
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
            row("contact_message_sent", json!({"secure_uuid": "uuid-X"})),
            row("match_page_view", json!({})),
            row("match_page_view", serde_json::Value::Null),
            row("newsletter_signup", json!({"secure_uuid": "uuid-B"})),
        ];
        let result = classify_events(
            &rows,
            &candidates(&[("uuid-A", "patient-1"), ("uuid-B", "patient-2"), ("uuid-C", "patient-3")]),
        );

        assert_eq!(result.len(), 3);
        assert_eq!(
            result["patient-1"],
            BehaviorSegment::VisitedNoAction { visit_count: 1 }
        );
        assert_eq!(result["patient-2"], BehaviorSegment::NeverVisited);
        assert_eq!(result["patient-3"], BehaviorSegment::NeverVisited);
        assert!(!result.values().any(|s| *s == BehaviorSegment::Contacted));
    }

    #[test]
    fn test_tokens_sharing_a_patient_pool_signals() {
        let rows = vec![row(
            "contact_message_sent",
            json!({"secure_uuid": "uuid-A"}),
        )];
        let shared = candidates(&[("uuid-A", "patient-1"), ("uuid-B", "patient-1")]);

        // HashMap iteration order varies per instance
        for _ in 0..50 {
            let result = classify_events(&rows, &shared.clone().into_iter().collect());
            assert_eq!(result.len(), 1);
            assert_eq!(result["patient-1"], BehaviorSegment::Contacted);
        }
    }

    #[test]
    fn test_shared_patient_views_add_up() {
        let rows = vec![
            row("match_page_view", json!({"secure_uuid": "uuid-B"})),
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
            row("match_page_view", json!({"secure_uuid": "uuid-A"})),
            row(
                "contact_modal_opened",
                json!({"secure_uuid": "uuid-C", "therapist_id": "t4"}),
            ),
        ];
        let result = classify_events(
            &rows,
            &candidates(&[("uuid-A", "patient-1"), ("uuid-B", "patient-1"), ("uuid-C", "patient-2")]),
        );

        assert_eq!(result.len(), 2);
        assert_eq!(
            result["patient-1"],
            BehaviorSegment::VisitedNoAction { visit_count: 3 }
        );
        assert_eq!(
            result["patient-2"],
            BehaviorSegment::AlmostBooked {
                therapist_id: "t4".to_string()
            }
        );
    }

    #[test]
    fn test_token_match_is_exact() {
        let rows = vec![
            row("match_page_view", json!({"secure_uuid": " uuid-A "})),
            row("match_page_view", json!({"secure_uuid": "UUID-A"})),
        ];
        let result = classify_events(&rows, &candidates(&[("uuid-A", "patient-1")]));

        assert_eq!(result["patient-1"], BehaviorSegment::NeverVisited);
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_query() {
        let store = Arc::new(CountingStore::with_rows(vec![row(
            "match_page_view",
            json!({"secure_uuid": "uuid-A"}),
        )]));
        let classifier = BehaviorClassifier::new(store.clone());

        let result = classifier
            .classify(&HashMap::new(), Utc::now() - Duration::days(7))
            .await;

        assert!(result.is_empty());
        assert_eq!(store.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_failure_yields_empty_map() {
        let store = Arc::new(CountingStore::failing());
        let classifier = BehaviorClassifier::new(store.clone());

        let result = classifier
            .classify(
                &candidates(&[("uuid-A", "patient-1")]),
                Utc::now() - Duration::days(7),
            )
            .await;

        assert!(result.is_empty());
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_rows_yields_empty_map() {
        let store = Arc::new(CountingStore::with_rows(Vec::new()));
        let classifier = BehaviorClassifier::new(store);

        let result = classifier
            .classify(
                &candidates(&[("uuid-A", "patient-1")]),
                Utc::now() - Duration::days(7),
            )
            .await;

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_classify_against_sqlite() {
        let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
        let now = Utc::now();

        store
            .record(&row("match_page_view", json!({"secure_uuid": "uuid-A"})).at(now - Duration::days(40)))
            .await
            .unwrap();
        store
            .record(&row("match_page_view", json!({"secure_uuid": "uuid-A"})).at(now - Duration::days(2)))
            .await
            .unwrap();
        store
            .record(
                &row(
                    "contact_modal_opened",
                    json!({"secure_uuid": "uuid-B", "therapist_id": "t1"}),
                )
                .at(now - Duration::days(3)),
            )
            .await
            .unwrap();
        store
            .record(
                &row(
                    "contact_modal_opened",
                    json!({"secure_uuid": "uuid-B", "therapist_id": "t9"}),
                )
                .at(now - Duration::days(1)),
            )
            .await
            .unwrap();

        let classifier = BehaviorClassifier::new(store).max_rows(100);
        let result = classifier
            .classify(
                &candidates(&[("uuid-A", "patient-1"), ("uuid-B", "patient-2")]),
                now - Duration::days(30),
            )
            .await;

        // The 40-day-old view falls outside the window
        assert_eq!(
            result["patient-1"],
            BehaviorSegment::VisitedNoAction { visit_count: 1 }
        );
        assert_eq!(
            result["patient-2"],
            BehaviorSegment::AlmostBooked {
                therapist_id: "t9".to_string()
            }
        );
    }
}
