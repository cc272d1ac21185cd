//! Stream-side types shared by the connection manager and its callers
//!
//! - [`ConnectionScope`]: which event stream a connection serves
//! - [`CloseDisposition`]: what a close code means for reconnection
//! - [`EventRecord`]: one decoded inbound frame
//! - [`StreamEvent`]: lifecycle and data notifications delivered to callers

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Close code the service uses when the stream token is rejected
pub const CLOSE_AUTH_REJECTED: u16 = 4001;

/// Close code the service uses when the monitored job does not exist
pub const CLOSE_JOB_NOT_FOUND: u16 = 4004;

/// Close code sent on a caller-initiated disconnect
pub const CLOSE_NORMAL: u16 = 1000;

/// Event stream selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionScope {
    /// Service-wide event feed
    Global,
    /// Events of one job
    Job(String),
}

impl ConnectionScope {
    pub fn job(job_id: impl Into<String>) -> Self {
        ConnectionScope::Job(job_id.into())
    }

    /// Stream path relative to the service base URL
    pub fn path(&self) -> String {
        match self {
            ConnectionScope::Global => "/api/events".to_string(),
            ConnectionScope::Job(id) => format!("/api/download/jobs/{}/events", id),
        }
    }

    /// Reject a job scope whose id cannot be used as a path segment
    pub fn validate(&self) -> Result<()> {
        match self {
            ConnectionScope::Global => Ok(()),
            ConnectionScope::Job(id) => validate_job_id(id),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            ConnectionScope::Global => None,
            ConnectionScope::Job(id) => Some(id),
        }
    }
}

/// Check that `job_id` addresses exactly one path segment
///
/// Ids are interpolated into request and stream paths, so separators,
/// query or fragment markers, escapes, and dot segments are refused.
pub fn validate_job_id(job_id: &str) -> Result<()> {
    if job_id.trim().is_empty() {
        return Err(ClientError::validation("job_id is required"));
    }
    let forbidden = |c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control();
    if job_id == "." || job_id == ".." || job_id.contains(forbidden) {
        return Err(ClientError::validation(format!(
            "job_id '{}' is not a valid path segment",
            job_id.escape_debug()
        )));
    }
    Ok(())
}

impl fmt::Display for ConnectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionScope::Global => f.write_str("global"),
            ConnectionScope::Job(id) => write!(f, "job:{}", id),
        }
    }
}

/// Reconnection verdict for a closed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Token rejected; terminal in every scope
    AuthRejected,
    /// Job unknown to the service; terminal, job scope only
    JobNotFound,
    /// Anything else; eligible for reconnection
    Transient,
}

impl CloseDisposition {
    /// Interpret a close code for the given scope
    ///
    /// `None` means the connection ended without a close frame (handshake
    /// failure, reset, abrupt EOF), which is always transient.
    pub fn from_close(scope: &ConnectionScope, code: Option<u16>) -> Self {
        match (code, scope) {
            (Some(CLOSE_AUTH_REJECTED), _) => CloseDisposition::AuthRejected,
            (Some(CLOSE_JOB_NOT_FOUND), ConnectionScope::Job(_)) => CloseDisposition::JobNotFound,
            _ => CloseDisposition::Transient,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CloseDisposition::Transient)
    }
}

/// Decoded inbound frame
///
/// The record shape belongs to the service. Only the conventional `type`
/// discriminator is lifted out; every other member is kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EventRecord {
    /// Decode a text frame
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Decode a binary frame
    pub fn decode_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Notification delivered for a stream scope
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Handshake completed, or the scope was already open when connect was called
    Open,
    /// Inbound frame
    Message(EventRecord),
    /// Connection ended; always delivered before the close is interpreted
    Closed {
        /// Close code, `None` when no close frame was received
        code: Option<u16>,
        reason: String,
    },
    /// Close code 4001; no reconnection follows
    AuthRejected,
    /// Close code 4004 on a job stream; no reconnection follows
    JobNotFound,
    /// Transport fault; the following `Closed` decides what happens next
    Error(String),
    /// A reconnect has been scheduled
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
        delay: Duration,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::AuthRejected | StreamEvent::JobNotFound)
    }
}
