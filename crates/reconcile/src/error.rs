//! Error taxonomy for reconciliation.
//!
//! Remote failures are classified so the poller can decide whether to keep
//! waiting, and orchestration errors record which remote resource (if any)
//! exists after the failure so a caller never loses track of it.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The remote resource does not exist (yet, or any more)
    NotFound,
    /// The remote API is temporarily unavailable
    Transient,
    /// The remote API rejected the request outright
    Fatal,
}

impl ErrorClass {
    /// Whether this class is worth another attempt inside a poll loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error class.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "resource not found",
            Self::Transient => "remote API temporarily unavailable",
            Self::Fatal => "request rejected",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A classified failure returned by a remote API client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class}: {message}")]
pub struct RemoteError {
    pub class: ErrorClass,
    pub message: String,
}

impl RemoteError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Fatal, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.class == ErrorClass::NotFound
    }
}

/// A desired specification that cannot be turned into a remote request.
///
/// Always produced locally, before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .field.as_deref().unwrap_or("specification"))]
pub struct ConfigError {
    /// Attribute path the problem was found at, if it is attributable
    pub field: Option<String>,
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// Errors returned by the lifecycle orchestrator.
///
/// Every variant names the resource kind and, where one exists, the id of
/// the remote resource so an operator can decide to retry, delete, or
/// intervene manually.
#[derive(Debug, Error)]
pub enum Error {
    /// The desired specification is invalid; nothing was sent to the remote API
    #[error("{kind}: invalid configuration: {source}")]
    InvalidConfiguration {
        kind: &'static str,
        #[source]
        source: ConfigError,
    },

    /// The operation needs tracked state that the host does not have
    #[error("{kind}: no observed state is tracked; create or import it first")]
    Untracked { kind: &'static str },

    /// The remote API rejected a request
    #[error("{kind}{}: remote API rejected the request: {message}", display_id(.id))]
    Fatal {
        kind: &'static str,
        id: Option<String>,
        /// Whether a mutating call was accepted before the failure
        applied: bool,
        message: String,
    },

    /// The remote API was unavailable for a call that is never retried
    #[error("{kind}{}: remote API unavailable: {message}", display_id(.id))]
    Transient {
        kind: &'static str,
        id: Option<String>,
        applied: bool,
        message: String,
    },

    /// Polling hit its deadline; the last observed state has been persisted
    #[error("{kind} {id}: timed out after {}s waiting for {waiting_for}: {reason}", .waited.as_secs())]
    Timeout {
        kind: &'static str,
        id: String,
        waiting_for: &'static str,
        waited: Duration,
        reason: String,
    },

    /// The caller cancelled the operation
    #[error("{kind}{}: cancelled", display_id(.id))]
    Cancelled {
        kind: &'static str,
        id: Option<String>,
        applied: bool,
    },

    /// Deletion protection blocked a destructive operation
    #[error("{kind} {id}: {message}")]
    PolicyViolation {
        kind: &'static str,
        id: String,
        message: String,
    },

    /// The desired change touches fields that cannot be updated in place
    #[error("{kind} {id}: cannot update in place, replacement required for: {}", .fields.join(", "))]
    ReplaceRequired {
        kind: &'static str,
        id: String,
        fields: Vec<String>,
    },

    /// The host holds a record for the instance that it cannot decode
    #[error("{kind}{}: stored state is unreadable: {message}", display_id(.id))]
    UnreadableState {
        kind: &'static str,
        id: Option<String>,
        message: String,
    },

    /// The host failed to persist observed state
    #[error("{kind}{}: failed to persist state: {message}", display_id(.id))]
    Persist {
        kind: &'static str,
        id: Option<String>,
        applied: bool,
        message: String,
    },
}

fn display_id(id: &Option<String>) -> String {
    id.as_deref().map(|id| format!(" {id}")).unwrap_or_default()
}

impl Error {
    pub fn invalid(kind: &'static str, source: ConfigError) -> Self {
        Self::InvalidConfiguration { kind, source }
    }

    /// Map a failed remote call to an orchestration error.
    pub fn remote(kind: &'static str, id: Option<String>, applied: bool, err: RemoteError) -> Self {
        match err.class {
            ErrorClass::Transient => Self::Transient {
                kind,
                id,
                applied,
                message: err.message,
            },
            ErrorClass::NotFound | ErrorClass::Fatal => Self::Fatal {
                kind,
                id,
                applied,
                message: err.to_string(),
            },
        }
    }

    /// Resource kind the error belongs to.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { kind, .. }
            | Self::Untracked { kind }
            | Self::Fatal { kind, .. }
            | Self::Transient { kind, .. }
            | Self::Timeout { kind, .. }
            | Self::Cancelled { kind, .. }
            | Self::PolicyViolation { kind, .. }
            | Self::ReplaceRequired { kind, .. }
            | Self::UnreadableState { kind, .. }
            | Self::Persist { kind, .. } => kind,
        }
    }

    /// Id of the remote resource that exists after this failure, if any.
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::InvalidConfiguration { .. } | Self::Untracked { .. } => None,
            Self::Fatal { id, .. }
            | Self::Transient { id, .. }
            | Self::Cancelled { id, .. }
            | Self::UnreadableState { id, .. }
            | Self::Persist { id, .. } => id.as_deref(),
            Self::Timeout { id, .. }
            | Self::PolicyViolation { id, .. }
            | Self::ReplaceRequired { id, .. } => Some(id),
        }
    }

    /// Whether the remote side may have changed before the failure.
    ///
    /// `false` means the whole operation can be retried from scratch. `true`
    /// means a mutating call was accepted; the caller must resume from a Read
    /// rather than repeat the mutation.
    pub fn remote_changed(&self) -> bool {
        match self {
            Self::Fatal { applied, .. }
            | Self::Transient { applied, .. }
            | Self::Cancelled { applied, .. }
            | Self::Persist { applied, .. } => *applied,
            Self::Timeout { .. } => true,
            Self::InvalidConfiguration { .. }
            | Self::Untracked { .. }
            | Self::UnreadableState { .. }
            | Self::PolicyViolation { .. }
            | Self::ReplaceRequired { .. } => false,
        }
    }

    pub fn is_replace_required(&self) -> bool {
        matches!(self, Self::ReplaceRequired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_retryable() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::NotFound.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::field("spec", "exactly one of pod or serverless must be set");
        assert_eq!(
            err.to_string(),
            "spec: exactly one of pod or serverless must be set"
        );

        let err = ConfigError::new("no desired specification");
        assert_eq!(err.to_string(), "specification: no desired specification");
    }

    #[test]
    fn test_remote_maps_not_found_to_fatal() {
        let err = Error::remote("index", None, false, RemoteError::not_found("HTTP 404"));
        assert!(matches!(err, Error::Fatal { .. }));
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_remote_keeps_transient() {
        let err = Error::remote(
            "index",
            Some("docs".into()),
            true,
            RemoteError::transient("HTTP 503"),
        );
        assert!(matches!(err, Error::Transient { .. }));
        assert_eq!(err.remote_id(), Some("docs"));
        assert!(err.remote_changed());
    }

    #[test]
    fn test_timeout_reports_existing_resource() {
        let err = Error::Timeout {
            kind: "index",
            id: "docs".into(),
            waiting_for: "readiness",
            waited: Duration::from_secs(600),
            reason: "state Initializing".into(),
        };
        assert_eq!(err.remote_id(), Some("docs"));
        assert!(err.remote_changed());
        assert!(err.to_string().contains("600s"));
    }

    #[test]
    fn test_local_errors_are_safe_to_retry() {
        let err = Error::invalid("index", ConfigError::new("bad"));
        assert_eq!(err.remote_id(), None);
        assert!(!err.remote_changed());

        let err = Error::ReplaceRequired {
            kind: "index",
            id: "docs".into(),
            fields: vec!["dimension".into(), "metric".into()],
        };
        assert!(!err.remote_changed());
        assert!(err.is_replace_required());
        assert!(err.to_string().ends_with("dimension, metric"));
    }
}
