//! Transactional Email
//!
//! Thin wrapper around the email provider's REST API.
//!
//! ## Send path
//!
//! 1. Skip when no API key is configured or no recipients remain
//! 2. Suppress or redirect outbound mail (non-production)
//! 3. Derive a deterministic idempotency key from the message context
//! 4. Rewrite therapist photo URLs to the same-domain image proxy and derive
//!    a plain-text body when none was given
//! 5. POST with a per-attempt timeout, retrying 429/5xx with exponential backoff
//!
//! Delivery failures are logged and returned as [`SendOutcome::Failed`];
//! they never abort the operation that triggered the email.

mod client;
mod error;
mod idempotency;
mod images;
mod message;
mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{EmailClient, RetryPolicy};
pub use error::{EmailError, EmailResult};
pub use idempotency::idempotency_key;
pub use images::ImageProxy;
pub use message::{resolve_recipients, Attachment, EmailContext, EmailMessage, SendOutcome, SkipReason};
pub use text::HtmlToText;
