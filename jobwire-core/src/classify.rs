//! Failure classification
//!
//! The classifier is the single place where raw request/response failures
//! become [`ClientError`]s. It is a pure, total function: every
//! [`RawFailure`] maps to exactly one [`ErrorKind`], and nothing here performs
//! I/O.
//!
//! # Rules
//!
//! Applied in priority order:
//!
//! 1. timeout or cancellation → `Timeout`
//! 2. status 401 / 403 → `Auth`
//! 3. status 404 → `NotFound`
//! 4. status 500..600 → `Server`
//! 5. transport connection fault → `Network`
//! 6. anything else (other statuses, undecodable bodies, unexpected faults) → `Unknown`
//!
//! Transport crates are kept out of this crate; callers lower their own
//! error types into a [`RawFailure`] first.

use crate::error::{ClientError, ErrorKind, ErrorSource};
use serde_json::Value;

/// Raw outcome of a failed request/response attempt
#[derive(Debug, Clone)]
pub enum RawFailure {
    /// The deadline expired or the call was cancelled
    TimedOut {
        /// Deadline that was exceeded, in milliseconds
        after_ms: u64,
    },

    /// The transport failed before a response was obtained
    Transport {
        /// Transport description of the fault
        message: String,
        /// Whether the fault concerns the connection itself
        /// (refused, reset, DNS, broken body stream)
        connection: bool,
        source: Option<ErrorSource>,
    },

    /// The server answered with a non-success status
    Status {
        status: u16,
        /// Parsed error body, if the body was valid JSON
        body: Option<Value>,
    },

    /// A response arrived but its payload could not be decoded
    Decode {
        message: String,
        source: Option<ErrorSource>,
    },
}

/// Convert a raw failure into a classified error
pub fn classify(failure: RawFailure) -> ClientError {
    match failure {
        RawFailure::TimedOut { after_ms } => {
            ClientError::timeout(format!("Request timed out after {} ms", after_ms))
        }
        RawFailure::Status { status, body } => {
            let kind = kind_for_status(status);
            let message = body
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| default_status_message(status));
            ClientError::new(kind, message).with_status(status)
        }
        RawFailure::Transport {
            message,
            connection,
            source,
        } => {
            let kind = if connection {
                ErrorKind::Network
            } else {
                ErrorKind::Unknown
            };
            let err = ClientError::new(kind, message);
            match source {
                Some(source) => err.with_shared_source(source),
                None => err,
            }
        }
        RawFailure::Decode { message, source } => {
            let err = ClientError::unknown(format!("Failed to decode response: {}", message));
            match source {
                Some(source) => err.with_shared_source(source),
                None => err,
            }
        }
    }
}

/// Map an HTTP status to its taxonomy member
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        404 => ErrorKind::NotFound,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

fn default_status_message(status: u16) -> String {
    match kind_for_status(status) {
        ErrorKind::Auth => format!("Authentication failed (HTTP {})", status),
        ErrorKind::NotFound => format!("Resource not found (HTTP {})", status),
        ErrorKind::Server => format!("Server error (HTTP {})", status),
        _ => format!("Request failed (HTTP {})", status),
    }
}

/// Extract a server-supplied message from a structured error body
///
/// Recognised shapes, first match wins:
/// `{"error": {"message": ..}}`, `{"error": ".."}`, `{"message": ..}`,
/// `{"detail": ..}`.
pub fn error_message(body: &Value) -> Option<String> {
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match body.get("error") {
        Some(Value::Object(obj)) => {
            if let Some(msg) = obj.get("message").and_then(non_empty) {
                return Some(msg);
            }
        }
        Some(other) => {
            if let Some(msg) = non_empty(other) {
                return Some(msg);
            }
        }
        None => {}
    }

    body.get("message")
        .and_then(non_empty)
        .or_else(|| body.get("detail").and_then(non_empty))
}
