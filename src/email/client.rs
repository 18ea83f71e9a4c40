//! Email provider REST client
//!
//! HTTP client for the transactional email provider's `POST /emails`.

use crate::config::{Config, EmailConfig};
use crate::email::{
    idempotency_key, resolve_recipients, Attachment, EmailError, EmailMessage, EmailResult,
    HtmlToText, ImageProxy, SendOutcome, SkipReason,
};
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Exponential backoff between send attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each time
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EmailConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            ..Default::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// A provider `Retry-After` hint can lengthen the delay but never past
    /// `max_delay`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let delay = match retry_after {
            Some(hint) => backoff.max(hint),
            None => backoff,
        };
        delay.min(self.max_delay)
    }
}

/// Transactional email client
pub struct EmailClient {
    client: Client,
    config: EmailConfig,
    retry: RetryPolicy,
    images: ImageProxy,
    text: HtmlToText,
}

impl EmailClient {
    /// Create a new email client from the application configuration
    pub fn new(config: &Config) -> EmailResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.email.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            config: config.email.clone(),
            retry: RetryPolicy::from_config(&config.email),
            images: ImageProxy::from_config(config)?,
            text: HtmlToText::new()?,
        })
    }

    /// Builder method: override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get the current configuration
    pub fn config(&self) -> &EmailConfig {
        &self.config
    }

    /// Whether sends will reach the provider at all
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Send a message. Never returns an error; failures are logged and
    /// reported as [`SendOutcome::Failed`].
    pub async fn send(&self, message: &EmailMessage) -> SendOutcome {
        let ctx = &message.context;

        let api_key = match self.config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => {
                tracing::debug!(kind = %ctx.label(), "Email provider not configured, skipping send");
                return SendOutcome::Skipped(SkipReason::NotConfigured);
            }
        };

        let recipients = resolve_recipients(&message.to);
        if recipients.is_empty() {
            tracing::debug!(kind = %ctx.label(), "No recipients, skipping send");
            return SendOutcome::Skipped(SkipReason::NoRecipients);
        }

        if self.config.suppress_outbound {
            tracing::info!(
                to = ?recipients,
                subject = %message.subject,
                kind = %ctx.label(),
                "email_suppressed"
            );
            return SendOutcome::Skipped(SkipReason::Suppressed);
        }

        // Keyed on the logical recipients, before any redirect
        let key = if self.config.disable_idempotency {
            None
        } else {
            Some(idempotency_key(&recipients, &message.subject, ctx))
        };

        let recipients = match self.config.redirect_to.as_deref().map(str::trim) {
            Some(redirect) if !redirect.is_empty() => {
                tracing::info!(
                    original_to = ?recipients,
                    redirect_to = %redirect,
                    subject = %message.subject,
                    kind = %ctx.label(),
                    "email_redirected"
                );
                vec![redirect.to_string()]
            }
            _ => recipients,
        };

        let request = self.build_request(message, &recipients);
        self.deliver(api_key, &request, key.as_deref(), message).await
    }

    /// Apply image rewriting and the plain-text fallback
    fn build_request<'a>(&'a self, message: &'a EmailMessage, to: &'a [String]) -> SendRequest<'a> {
        let html = message
            .html
            .as_deref()
            .map(|h| self.images.rewrite(h).into_owned());

        let text = match (&message.text, &html) {
            (Some(text), _) => Some(self.images.rewrite(text).into_owned()),
            (None, Some(html)) => Some(self.text.convert(html)).filter(|t| !t.is_empty()),
            (None, None) => None,
        };

        SendRequest {
            from: &self.config.from,
            to,
            subject: &message.subject,
            html,
            text,
            reply_to: message.reply_to.as_deref(),
            headers: &message.headers,
            attachments: message.attachments.iter().map(AttachmentPayload::from).collect(),
        }
    }

    /// POST with retry logic
    async fn deliver(
        &self,
        api_key: &str,
        request: &SendRequest<'_>,
        idempotency_key: Option<&str>,
        message: &EmailMessage,
    ) -> SendOutcome {
        let ctx = &message.context;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.post_once(api_key, request, idempotency_key).await {
                Ok(id) => {
                    tracing::info!(
                        id = ?id,
                        attempts = attempt,
                        kind = %ctx.label(),
                        patient_id = ?ctx.patient_id,
                        therapist_id = ?ctx.therapist_id,
                        "email_sent"
                    );
                    return SendOutcome::Sent { id, attempts: attempt };
                }
                Err(failure) => failure,
            };

            if failure.error.is_retryable() && attempt < max_attempts {
                let delay = self.retry.delay(attempt, failure.retry_after);
                tracing::warn!(
                    attempt,
                    status = ?failure.error.status(),
                    delay_ms = delay.as_millis() as u64,
                    kind = %ctx.label(),
                    "Email send failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = match &failure.error {
                EmailError::ApiError { message, .. } => message.as_str(),
                _ => "",
            };
            tracing::error!(
                status = ?failure.error.status(),
                body = %body,
                error = %failure.error,
                attempts = attempt,
                subject = %message.subject,
                kind = %ctx.label(),
                patient_id = ?ctx.patient_id,
                therapist_id = ?ctx.therapist_id,
                match_id = ?ctx.match_id,
                "email_send_failed"
            );
            return SendOutcome::Failed(failure.error);
        }
    }

    /// One attempt. `Ok(None)` means the provider reported a duplicate.
    async fn post_once(
        &self,
        api_key: &str,
        request: &SendRequest<'_>,
        idempotency_key: Option<&str>,
    ) -> Result<Option<String>, AttemptError> {
        let url = format!("{}/emails", self.config.api_base_url.trim_end_matches('/'));

        let mut builder = self.client.post(&url).bearer_auth(api_key).json(request);
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(|e| AttemptError {
            error: EmailError::from_transport(e),
            retry_after: None,
        })?;

        let status = response.status();

        if status.is_success() {
            let id = response
                .json::<SendResponse>()
                .await
                .ok()
                .and_then(|r| r.id);
            return Ok(id);
        }

        if status == StatusCode::CONFLICT {
            tracing::info!("email_deduplicated");
            return Ok(None);
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();

        Err(AttemptError {
            error: EmailError::ApiError {
                status: status.as_u16(),
                message: text,
            },
            retry_after,
        })
    }
}

struct AttemptError {
    error: EmailError,
    retry_after: Option<Duration>,
}

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct AttachmentPayload<'a> {
    filename: &'a str,
    /// Base64-encoded file content
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
}

impl<'a> From<&'a Attachment> for AttachmentPayload<'a> {
    fn from(attachment: &'a Attachment) -> Self {
        Self {
            filename: &attachment.filename,
            content: base64::engine::general_purpose::STANDARD.encode(&attachment.content),
            content_type: attachment.content_type.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}
