//! Error types for Pinecone API calls.
//!
//! Errors are categorized so callers can tell an absent resource from a
//! temporary outage and from a request the API will never accept.

use std::fmt;

/// Result type alias for Pinecone operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// The resource does not exist.
    NotFound,
    /// Missing or rejected credentials.
    Auth,
    /// The API rejected the request (validation, conflict, quota).
    Rejected,
    /// The response could not be decoded.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Resource not found",
            Self::Auth => "Authentication failed",
            Self::Rejected => "Request rejected",
            Self::Format => "Invalid API response",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::NotFound => "Verify the resource name or id is correct",
            Self::Auth => "Set PINECONE_API_KEY (or PINECONE_ADMIN_TOKEN for projects and API keys)",
            Self::Rejected => "Check the request parameters and your project quota",
            Self::Format => "The API may have changed; check the configured API version",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur when calling the Pinecone APIs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// A credential needed for this API is not configured.
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Create a 404 error for a named resource.
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::http(format!("HTTP 404: {what} not found"), Some(404))
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::HttpError { status, .. } => match status {
                Some(404) => ErrorCategory::NotFound,
                Some(401 | 403) => ErrorCategory::Auth,
                Some(408 | 429 | 500..=599) | None => ErrorCategory::Network,
                Some(_) => ErrorCategory::Rejected,
            },
            Error::MissingCredentials(_) => ErrorCategory::Auth,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            ureq::Error::Json(e) => Self::InvalidResponse(e.to_string()),
            other => Self::HttpError {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
