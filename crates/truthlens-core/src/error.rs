//! Error type shared by every client in the core library.
//!
//! Remote failures are classified into the handful of reasons the UI
//! distinguishes (rate limit, quota, generic) so front-ends can pick the
//! right notification without string matching.

use thiserror::Error;

/// The primary error type for truthlens-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any remote call was made.
    #[error("validation error: {0}")]
    Validation(String),

    /// The anonymous free-use cap has been reached.
    #[error("free usage limit reached")]
    UsageLimitReached,

    /// The backend asked us to slow down (HTTP 429).
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The workspace allowance is exhausted (HTTP 402).
    #[error("payment required: {0}")]
    QuotaExceeded(String),

    /// Any other non-success response or `{error}` body.
    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Local persistence failure (history database, state files).
    #[error("storage error: {0}")]
    Storage(String),

    /// Sign-in / sign-up / OTP failures reported by the auth service.
    #[error("auth error: {0}")]
    Auth(String),
}

/// A specialized Result type for truthlens-core.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a remote status code and message onto the error taxonomy.
    ///
    /// The analyze function reports its classification inside an
    /// `{error}` body as well as through the status, so both are checked.
    pub fn classify(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if status == 429 || lower.contains("rate limit") {
            Error::RateLimited(message)
        } else if status == 402 || lower.contains("payment required") {
            Error::QuotaExceeded(message)
        } else {
            Error::Remote { status, message }
        }
    }

    /// True for conditions the user may simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::Remote { .. } | Error::Http(_))
    }

    /// Text for the transient notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::UsageLimitReached => {
                "Free trial exhausted. Please sign in to continue.".to_string()
            }
            Error::RateLimited(_) => "Rate limit exceeded. Please try again later.".to_string(),
            Error::QuotaExceeded(_) => "Usage limit reached. Please add credits.".to_string(),
            Error::Auth(msg) => msg.clone(),
            Error::Storage(_) | Error::Io(_) => {
                "Could not access local storage. Please try again.".to_string()
            }
            Error::Remote { .. } | Error::Http(_) | Error::Json(_) => {
                "Request failed. Please try again.".to_string()
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_status() {
        assert!(matches!(Error::classify(429, "slow down"), Error::RateLimited(_)));
        assert!(matches!(Error::classify(402, "nope"), Error::QuotaExceeded(_)));
        assert!(matches!(
            Error::classify(500, "boom"),
            Error::Remote { status: 500, .. }
        ));
    }

    #[test]
    fn classify_by_message() {
        let err = Error::classify(500, "Rate limit exceeded. Please try again later.");
        assert!(matches!(err, Error::RateLimited(_)));

        let err = Error::classify(200, "Payment required. Please add credits to your workspace.");
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }

    #[test]
    fn quota_is_not_retryable() {
        assert!(!Error::QuotaExceeded("x".into()).is_retryable());
        assert!(Error::RateLimited("x".into()).is_retryable());
        assert!(!Error::UsageLimitReached.is_retryable());
    }

    #[test]
    fn quota_message_points_at_account_action() {
        let msg = Error::QuotaExceeded("x".into()).user_message();
        assert!(msg.contains("credits"));
        assert_ne!(msg, Error::RateLimited("x".into()).user_message());
    }
}
