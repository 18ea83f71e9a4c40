//! Email message types

use crate::email::EmailError;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// A rendered email ready for dispatch
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub reply_to: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub attachments: Vec<Attachment>,
    /// Correlation fields for logging and idempotency
    pub context: EmailContext,
}

impl EmailMessage {
    pub fn new<I, S>(to: I, subject: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to: to.into_iter().map(Into::into).collect(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Builder method: set the HTML body
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Builder method: set the plain-text body
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Builder method: add a custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn context(mut self, context: EmailContext) -> Self {
        self.context = context;
        self
    }
}

/// File attached to an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            content_type: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Correlation context attached to a send.
///
/// The named fields feed the idempotency key; `extra` is logged only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailContext {
    pub kind: Option<String>,
    pub template: Option<String>,
    pub match_id: Option<String>,
    pub patient_id: Option<String>,
    pub therapist_id: Option<String>,
    pub lead_id: Option<String>,
    pub email_token: Option<String>,
    pub digest_key: Option<String>,
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl EmailContext {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    /// Builder method: set a context field by name.
    ///
    /// Known correlation keys land in their typed slot, anything else in
    /// `extra`.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match key {
            "kind" => self.kind = value,
            "template" => self.template = value,
            "match_id" => self.match_id = value,
            "patient_id" => self.patient_id = value,
            "therapist_id" => self.therapist_id = value,
            "lead_id" => self.lead_id = value,
            "email_token" => self.email_token = value,
            "digest_key" => self.digest_key = value,
            "stage" => self.stage = value,
            other => {
                if let Some(v) = value {
                    self.extra.insert(other.to_string(), v);
                }
            }
        }
        self
    }

    /// Short label for log lines
    pub fn label(&self) -> &str {
        self.kind
            .as_deref()
            .or(self.template.as_deref())
            .unwrap_or("unknown")
    }
}

/// Trim, drop empties, and de-duplicate recipients case-insensitively,
/// keeping first-seen order.
pub fn resolve_recipients(to: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    to.iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .filter(|r| seen.insert(r.to_ascii_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Why a send was skipped without contacting the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No provider API key configured
    NotConfigured,
    /// Recipient list empty after resolution
    NoRecipients,
    /// Outbound email is suppressed in this environment
    Suppressed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::NotConfigured => "not_configured",
            SkipReason::NoRecipients => "no_recipients",
            SkipReason::Suppressed => "suppressed",
        };
        f.write_str(s)
    }
}

/// Result of a send
#[derive(Debug)]
pub enum SendOutcome {
    /// Accepted by the provider (or already accepted, on 409)
    Sent { id: Option<String>, attempts: u32 },
    Skipped(SkipReason),
    Failed(EmailError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SendOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SendOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_recipients() {
        let to = vec![
            " a@example.org ".to_string(),
            "".to_string(),
            "A@Example.org".to_string(),
            "b@example.org".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(
            resolve_recipients(&to),
            vec!["a@example.org".to_string(), "b@example.org".to_string()]
        );
        assert!(resolve_recipients(&[]).is_empty());
    }

    #[test]
    fn test_context_with() {
        let ctx = EmailContext::new("patient_followup")
            .with("patient_id", "p1")
            .with("stage", "day_3")
            .with("campaign", "spring");

        assert_eq!(ctx.kind.as_deref(), Some("patient_followup"));
        assert_eq!(ctx.patient_id.as_deref(), Some("p1"));
        assert_eq!(ctx.stage.as_deref(), Some("day_3"));
        assert_eq!(ctx.extra.get("campaign").map(String::as_str), Some("spring"));
        assert_eq!(ctx.label(), "patient_followup");
        assert_eq!(EmailContext::default().label(), "unknown");
    }

    #[test]
    fn test_message_builder() {
        let msg = EmailMessage::new(["a@example.org"], "Hello")
            .html("<p>Hi</p>")
            .reply_to("team@example.org")
            .header("X-Entity-Ref-ID", "abc")
            .attachment(Attachment::new("invite.ics", "BEGIN:VCALENDAR").content_type("text/calendar"));

        assert_eq!(msg.to, vec!["a@example.org".to_string()]);
        assert_eq!(msg.html.as_deref(), Some("<p>Hi</p>"));
        assert!(msg.text.is_none());
        assert_eq!(msg.headers.len(), 1);
        assert_eq!(msg.attachments[0].content_type.as_deref(), Some("text/calendar"));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Suppressed.to_string(), "suppressed");
        assert!(SendOutcome::Skipped(SkipReason::NoRecipients).is_skipped());
    }
}
