//! Error types for jobwire
//!
//! Every failure a caller can observe from the request path is a
//! [`ClientError`]. The error carries exactly one [`ErrorKind`] from a closed
//! taxonomy, a human-readable message, the HTTP status when one was
//! received, and optionally the underlying cause.
//!
//! # Taxonomy
//!
//! | Kind         | Produced by                                          | Retried |
//! |--------------|------------------------------------------------------|---------|
//! | `Network`    | connection refused/reset, DNS, broken body stream    | yes     |
//! | `Timeout`    | request exceeded its deadline or was cancelled       | no      |
//! | `Auth`       | HTTP 401 / 403                                       | no      |
//! | `NotFound`   | HTTP 404                                             | no      |
//! | `Server`     | HTTP 500-599                                         | yes     |
//! | `Validation` | missing identifying fields, rejected before sending  | no      |
//! | `Unknown`    | everything else, including undecodable payloads      | no      |
//!
//! The kind is fixed when the error is built. There is no API to change it
//! afterwards, so an error keeps its classification while it travels through
//! retries and facade operations.
//!
//! # Examples
//!
//! ```rust
//! use jobwire_core::{ClientError, ErrorKind};
//!
//! let err = ClientError::new(ErrorKind::Server, "upstream unavailable").with_status(503);
//! assert!(err.is_retryable());
//! assert_eq!(err.status(), Some(503));
//! ```

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for jobwire operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Boxed cause attached to a [`ClientError`]
///
/// Kept behind an `Arc` so that `ClientError` stays `Clone`.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level connection fault
    Network,
    /// Deadline expired or the call was cancelled
    Timeout,
    /// Credentials missing or rejected
    Auth,
    /// The addressed resource does not exist
    NotFound,
    /// The remote service failed (5xx)
    Server,
    /// The caller supplied an incomplete request
    Validation,
    /// Anything not covered above
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case label, used for metrics attributes and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Auth => "auth_error",
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::Server => "server_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Unknown => "unknown_error",
        }
    }

    /// Whether a failure of this kind may be caused by transient
    /// infrastructure trouble
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified client error
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<ErrorSource>,
}

impl ClientError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Attach the HTTP status code that produced this error
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Attach an already shared cause
    pub fn with_shared_source(mut self, source: ErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Taxonomy member
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, if a response was received
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the retry wrapper may re-invoke the failed operation
    pub fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }
}
