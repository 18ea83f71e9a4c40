//! Event types
//!
//! Raw rows carry an untyped property bag. [`BehaviorEvent`] is the typed
//! view used for segmentation: a row becomes a `BehaviorEvent` only if its
//! type is one of the relevant kinds and its properties carry the fields
//! that kind requires. Everything else is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types relevant to patient behavior segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Patient opened their match page
    MatchPageView,
    /// Patient rejected a proposed therapist
    MatchRejected,
    /// Patient opened the contact form for a therapist
    ContactModalOpened,
    /// Patient sent a message to a therapist
    ContactMessageSent,
}

impl EventType {
    /// All types the behavior classifier reads
    pub const BEHAVIOR: [EventType; 4] = [
        EventType::MatchPageView,
        EventType::MatchRejected,
        EventType::ContactModalOpened,
        EventType::ContactMessageSent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MatchPageView => "match_page_view",
            EventType::MatchRejected => "match_rejected",
            EventType::ContactModalOpened => "contact_modal_opened",
            EventType::ContactMessageSent => "contact_message_sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "match_page_view" => Some(EventType::MatchPageView),
            "match_rejected" => Some(EventType::MatchRejected),
            "contact_modal_opened" => Some(EventType::ContactModalOpened),
            "contact_message_sent" => Some(EventType::ContactMessageSent),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row of the event log, as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Free-form property bag (may be null)
    #[serde(default)]
    pub properties: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    /// Create a row stamped with the current time
    pub fn new(event_type: impl Into<String>, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            properties: Some(properties),
            created_at: Utc::now(),
        }
    }

    /// Builder method: set creation time
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Typed behavior event, keyed by event type
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorEvent {
    MatchPageView {
        secure_uuid: String,
    },
    MatchRejected {
        secure_uuid: String,
        therapist_id: String,
        reason: String,
        details: Option<String>,
    },
    ContactModalOpened {
        secure_uuid: String,
        therapist_id: String,
    },
    ContactMessageSent {
        secure_uuid: String,
        therapist_id: Option<String>,
    },
}

/// Reason recorded when a rejection event carries none
const UNSPECIFIED_REASON: &str = "unspecified";

impl BehaviorEvent {
    /// Validate a raw row into a typed event.
    ///
    /// Returns `None` for unrelated types, non-object property bags, a
    /// missing or empty `secure_uuid`, or a missing required field.
    pub fn from_row(row: &EventRow) -> Option<Self> {
        let event_type = EventType::parse(&row.event_type)?;
        let props = row.properties.as_ref()?.as_object()?;

        let text = |key: &str| -> Option<String> {
            props
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        // Tokens are matched byte-for-byte, so no trimming here
        let secure_uuid = props
            .get("secure_uuid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)?;

        let event = match event_type {
            EventType::MatchPageView => BehaviorEvent::MatchPageView { secure_uuid },
            EventType::MatchRejected => BehaviorEvent::MatchRejected {
                secure_uuid,
                therapist_id: text("therapist_id")?,
                reason: text("reason").unwrap_or_else(|| UNSPECIFIED_REASON.to_string()),
                details: text("details"),
            },
            EventType::ContactModalOpened => BehaviorEvent::ContactModalOpened {
                secure_uuid,
                therapist_id: text("therapist_id")?,
            },
            EventType::ContactMessageSent => BehaviorEvent::ContactMessageSent {
                secure_uuid,
                therapist_id: text("therapist_id"),
            },
        };

        Some(event)
    }

    /// Token identifying the patient this event belongs to
    pub fn secure_uuid(&self) -> &str {
        match self {
            BehaviorEvent::MatchPageView { secure_uuid }
            | BehaviorEvent::MatchRejected { secure_uuid, .. }
            | BehaviorEvent::ContactModalOpened { secure_uuid, .. }
            | BehaviorEvent::ContactMessageSent { secure_uuid, .. } => secure_uuid,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            BehaviorEvent::MatchPageView { .. } => EventType::MatchPageView,
            BehaviorEvent::MatchRejected { .. } => EventType::MatchRejected,
            BehaviorEvent::ContactModalOpened { .. } => EventType::ContactModalOpened,
            BehaviorEvent::ContactMessageSent { .. } => EventType::ContactMessageSent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_names() {
        for t in EventType::BEHAVIOR {
            assert_eq!(EventType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EventType::parse("page_view"), None);
    }

    #[test]
    fn test_parse_page_view() {
        let row = EventRow::new("match_page_view", json!({"secure_uuid": "uuid-A"}));
        assert_eq!(
            BehaviorEvent::from_row(&row),
            Some(BehaviorEvent::MatchPageView {
                secure_uuid: "uuid-A".to_string()
            })
        );
    }

    #[test]
    fn test_parse_rejection() {
        let row = EventRow::new(
            "match_rejected",
            json!({"secure_uuid": "uuid-A", "therapist_id": "t1", "reason": "too_expensive", "details": "too far"}),
        );
        match BehaviorEvent::from_row(&row) {
            Some(BehaviorEvent::MatchRejected {
                therapist_id,
                reason,
                details,
                ..
            }) => {
                assert_eq!(therapist_id, "t1");
                assert_eq!(reason, "too_expensive");
                assert_eq!(details.as_deref(), Some("too far"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_rejection_without_reason() {
        let row = EventRow::new(
            "match_rejected",
            json!({"secure_uuid": "uuid-A", "therapist_id": "t1"}),
        );
        match BehaviorEvent::from_row(&row) {
            Some(BehaviorEvent::MatchRejected { reason, details, .. }) => {
                assert_eq!(reason, "unspecified");
                assert!(details.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_rows_are_ignored() {
        let rows = vec![
            EventRow::new("match_page_view", json!({})),
            EventRow::new("match_page_view", json!({"secure_uuid": ""})),
            EventRow::new("match_page_view", json!({"secure_uuid": 42})),
            EventRow::new("match_page_view", json!("uuid-A")),
            EventRow::new("match_rejected", json!({"secure_uuid": "uuid-A", "reason": "x"})),
            EventRow::new("contact_modal_opened", json!({"secure_uuid": "uuid-A"})),
            EventRow::new("page_view", json!({"secure_uuid": "uuid-A"})),
            EventRow {
                event_type: "match_page_view".to_string(),
                properties: None,
                created_at: Utc::now(),
            },
        ];

        for row in rows {
            assert_eq!(BehaviorEvent::from_row(&row), None, "row: {:?}", row);
        }
    }

    #[test]
    fn test_message_sent_without_therapist() {
        let row = EventRow::new("contact_message_sent", json!({"secure_uuid": "uuid-A"}));
        let event = BehaviorEvent::from_row(&row).unwrap();
        assert_eq!(event.secure_uuid(), "uuid-A");
        assert_eq!(event.event_type(), EventType::ContactMessageSent);
    }

    #[test]
    fn test_secure_uuid_kept_verbatim() {
        let row = EventRow::new(
            "match_rejected",
            json!({"secure_uuid": " uuid-A ", "therapist_id": " t1 ", "reason": "  "}),
        );
        match BehaviorEvent::from_row(&row) {
            Some(BehaviorEvent::MatchRejected {
                secure_uuid,
                therapist_id,
                reason,
                ..
            }) => {
                assert_eq!(secure_uuid, " uuid-A ");
                assert_eq!(therapist_id, "t1");
                assert_eq!(reason, "unspecified");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
