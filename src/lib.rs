//! jobwire - resilient client for a remote job-processing service
//!
//! This is the main convenience crate that re-exports the jobwire sub-crates.
//! Use this crate if you want a single dependency for the whole client.
//!
//! # Architecture
//!
//! jobwire is organized into modular crates:
//!
//! - **jobwire-core**: Error taxonomy, classifier, envelopes, stream types,
//!   observability
//! - **jobwire-client**: HTTP executor, retries, per-scope event streams,
//!   and the `JobClient` facade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jobwire::JobClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JobClient::new("http://localhost:8888", "secret")?;
//!
//!     for job in client.list_jobs(true).await? {
//!         println!("{}", job);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
pub use jobwire_client as client;
pub use jobwire_core as core;

// Convenience re-exports of the most commonly used types
pub use jobwire_client::{ClientBuilder, JobClient};
pub use jobwire_core::{ClientError, ConnectionScope, ErrorKind, StreamEvent};
