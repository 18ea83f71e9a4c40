//! Idempotency keys
//!
//! The provider collapses sends carrying the same `Idempotency-Key`, so a
//! timeout followed by a retry, or a duplicate trigger of the same logical
//! event, delivers one email.

use crate::email::EmailContext;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fields that identify one logical email
#[derive(Serialize)]
struct KeyMaterial<'a> {
    to: &'a [String],
    subject: &'a str,
    match_id: Option<&'a str>,
    patient_id: Option<&'a str>,
    therapist_id: Option<&'a str>,
    lead_id: Option<&'a str>,
    email_token: Option<&'a str>,
    kind: Option<&'a str>,
    template: Option<&'a str>,
    digest_key: Option<&'a str>,
    stage: Option<&'a str>,
}

/// Hex SHA-256 over the stable identifying fields of a send.
///
/// `extra` context entries are deliberately not part of the key.
pub fn idempotency_key(to: &[String], subject: &str, context: &EmailContext) -> String {
    let material = KeyMaterial {
        to,
        subject,
        match_id: context.match_id.as_deref(),
        patient_id: context.patient_id.as_deref(),
        therapist_id: context.therapist_id.as_deref(),
        lead_id: context.lead_id.as_deref(),
        email_token: context.email_token.as_deref(),
        kind: context.kind.as_deref(),
        template: context.template.as_deref(),
        digest_key: context.digest_key.as_deref(),
        stage: context.stage.as_deref(),
    };

    // A JSON encoding keeps field boundaries unambiguous
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_context() -> EmailContext {
        EmailContext::new("patient_followup")
            .with("template", "reminder")
            .with("match_id", "m1")
            .with("patient_id", "p1")
            .with("therapist_id", "t1")
            .with("lead_id", "l1")
            .with("email_token", "tok")
    }

    fn to() -> Vec<String> {
        vec!["a@example.org".to_string()]
    }

    #[test]
    fn test_deterministic() {
        let a = idempotency_key(&to(), "Subject", &base_context());
        let b = idempotency_key(&to(), "Subject", &base_context());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_each_field_changes_key() {
        let reference = idempotency_key(&to(), "Subject", &base_context());

        let variants = vec![
            idempotency_key(&["b@example.org".to_string()], "Subject", &base_context()),
            idempotency_key(&to(), "Other subject", &base_context()),
            idempotency_key(&to(), "Subject", &base_context().with("match_id", "m2")),
            idempotency_key(&to(), "Subject", &base_context().with("patient_id", "p2")),
            idempotency_key(&to(), "Subject", &base_context().with("therapist_id", "t2")),
            idempotency_key(&to(), "Subject", &base_context().with("lead_id", "l2")),
            idempotency_key(&to(), "Subject", &base_context().with("email_token", "tok2")),
            idempotency_key(&to(), "Subject", &base_context().with("kind", "booking")),
            idempotency_key(&to(), "Subject", &base_context().with("template", "nudge")),
            idempotency_key(&to(), "Subject", &base_context().with("digest_key", "2026-10")),
            idempotency_key(&to(), "Subject", &base_context().with("stage", "day_7")),
        ];

        for variant in variants {
            assert_ne!(variant, reference);
        }
    }

    #[test]
    fn test_extra_context_is_ignored() {
        let a = idempotency_key(&to(), "Subject", &base_context());
        let b = idempotency_key(&to(), "Subject", &base_context().with("request_id", "r-123"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_field_boundaries() {
        let a = idempotency_key(&to(), "Subject", &EmailContext::default().with("match_id", "ab"));
        let b = idempotency_key(
            &to(),
            "Subject",
            &EmailContext::default().with("match_id", "a").with("patient_id", "b"),
        );
        assert_ne!(a, b);
    }
}
