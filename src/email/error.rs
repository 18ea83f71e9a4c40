//! Email delivery error types

use thiserror::Error;

/// Errors that can occur when talking to the email provider
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EmailError {
    /// Classify a transport error from reqwest
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmailError::Timeout
        } else if err.is_connect() {
            EmailError::Unavailable
        } else {
            EmailError::Request(err)
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EmailError::Timeout | EmailError::Unavailable => true,
            EmailError::Request(e) => e.is_request() || e.is_body(),
            EmailError::ApiError { status, .. } => *status == 429 || *status >= 500,
            EmailError::Config(_) => false,
        }
    }

    /// HTTP status, when the provider answered
    pub fn status(&self) -> Option<u16> {
        match self {
            EmailError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for email operations
pub type EmailResult<T> = Result<T, EmailError>;
