//! Pushprobe Delivery Client
//!
//! Sends a serialized metric payload to a metrics ingestion endpoint and
//! classifies what happened.
//!
//! # Architecture
//!
//! - [`probe`] - body-less liveness check; any HTTP status counts as reachable
//! - [`push`] - single POST with optional snappy compression
//! - [`tls`] - transport identity (insecure, strict, mutual TLS)
//! - [`outcome`] - delivery state machine and failure classification
//!
//! Every operation runs to completion before the next one starts; nothing is
//! retried and no connection is reused.
//!
//! # Example
//!
//! ```no_run
//! use client::{probe, push, serialize, PushOptions};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let url = "https://localhost:8080";
//!     if !probe(url, Duration::from_secs(10)).await.is_reachable() {
//!         return;
//!     }
//!     let payload = serialize(&shared::fixture::build().unwrap());
//!     let report = push(url, payload, &PushOptions::default()).await;
//!     println!("{}", report.outcome);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod compression;
pub mod error;
pub mod outcome;
pub mod probe;
pub mod push;
pub mod request;
pub mod tls;

pub use compression::{Codec, CompressionStatus};
pub use error::TransportError;
pub use outcome::{DeliveryOutcome, DeliveryState, FailureKind, TransportFailure};
pub use probe::{probe, ProbeOutcome};
pub use push::{push, PushOptions, PushReport, DEFAULT_TIMEOUT};
pub use shared::exposition::serialize;
pub use tls::TransportIdentity;

/// Path of the ingestion endpoint, relative to the base URL.
pub const PUBLISH_PATH: &str = "/publish/metrics";

/// Appends [`PUBLISH_PATH`] to a base URL.
#[must_use]
pub fn publish_url(base: &str) -> String {
    format!("{}{PUBLISH_PATH}", base.trim_end_matches('/'))
}
