//! Core types for the jobwire job-service client
//!
//! This crate holds everything that does not touch a socket:
//!
//! - **Error handling**: the closed [`ErrorKind`] taxonomy and [`ClientError`]
//! - **Classification**: the pure mapping from raw request failures to errors
//! - **Envelopes**: normalization of bare and wrapped response bodies
//! - **Stream types**: scopes, close-code interpretation, event records
//! - **Observability**: OpenTelemetry and `tracing` bootstrap
//!
//! The `jobwire-client` crate builds the HTTP and WebSocket transports on top.
//!
//! # Example
//!
//! ```rust
//! use jobwire_core::{classify, ErrorKind, RawFailure};
//!
//! let err = classify(RawFailure::Status { status: 503, body: None });
//! assert_eq!(err.kind(), ErrorKind::Server);
//! assert!(err.is_retryable());
//! ```

pub mod classify;
pub mod envelope;
pub mod error;
pub mod observability;
pub mod types;

pub use classify::{classify, error_message, kind_for_status, RawFailure};
pub use envelope::Envelope;
pub use error::{ClientError, ErrorKind, ErrorSource, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    CloseDisposition, ConnectionScope, EventRecord, StreamEvent, CLOSE_AUTH_REJECTED,
    validate_job_id, CLOSE_JOB_NOT_FOUND, CLOSE_NORMAL,
};
