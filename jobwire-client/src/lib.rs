//! Resilient client for a remote job-processing service
//!
//! This crate talks to the service over two channels: request/response
//! calls over HTTP and server-pushed event streams over WebSocket.
//!
//! # Core Features
//!
//! - **Request Executor**: single attempt under a 30 s deadline, failures
//!   classified into [`ErrorKind`](jobwire_core::ErrorKind)
//! - **Retry Wrapper**: bounded exponential backoff for network and server
//!   failures only
//! - **Connection Manager**: one stream per scope (global or per job), with
//!   terminal close codes told apart from transient ones
//! - **Facade**: the service's job operations, tolerant of both response
//!   envelopes
//! - **Observability**: OpenTelemetry metrics and `tracing` spans
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jobwire_client::{JobClient, StartJobRequest};
//! use jobwire_core::{ConnectionScope, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JobClient::new("http://localhost:8888", "secret")?;
//!
//!     let job_id = client.start_job(&StartJobRequest::new("svc", "tt0133093")).await?;
//!     let mut events = client.subscribe(ConnectionScope::job(&job_id)).await;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             StreamEvent::Message(record) => println!("{:?}", record.event_type),
//!             event if event.is_terminal() => break,
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Custom Backoff
//!
//! ```rust,no_run
//! use jobwire_client::{ClientBuilder, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # fn example() -> jobwire_core::Result<()> {
//! let client = ClientBuilder::new("http://localhost:8888")
//!     .retry(
//!         ExponentialBackoff::new(Duration::from_millis(200))
//!             .with_max_attempts(5)
//!             .with_max_delay(Duration::from_secs(5))
//!             .with_jitter(),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
mod client_builder;
mod config;
mod connection;
mod connection_state;
mod executor;
mod metrics;
mod retry;

pub use backoff::{BackoffStrategy, ExponentialBackoff, NoBackoff};
pub use client::{JobClient, StartJobRequest};
pub use client_builder::ClientBuilder;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use connection::{ConnectOutcome, ConnectionManager, EventSink};
pub use connection_state::{ConnectionState, ScopeState};
pub use executor::{RequestExecutor, RequestSpec, DEFAULT_REQUEST_TIMEOUT};
pub use metrics::ClientMetrics;
pub use retry::with_retry;
