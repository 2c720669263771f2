//! Pushprobe Shared Library
//!
//! This crate contains the metric model, the sample fixture, and the binary
//! exposition codec used by the Pushprobe delivery client.
//!
//! # Modules
//!
//! - [`models`] - Metric families, label sets, and the per-run collection
//! - [`fixture`] - The sample collection covering every metric kind
//! - [`exposition`] - Length-delimited protobuf serialization
//!
//! # Example
//!
//! ```
//! use shared::models::{MetricCollection, MetricFamily};
//!
//! let mut collection = MetricCollection::new();
//! let family = MetricFamily::counter("rounds_total", "Rounds", &["round_type"]).unwrap();
//! let rounds = collection.register(family).unwrap();
//! rounds.inc(&[("round_type", "normal")], 5678.0).unwrap();
//!
//! assert!(rounds.inc(&[("round_type", "normal")], -1.0).is_err());
//! assert!(collection.validate().is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod exposition;
pub mod fixture;
pub mod models;

/// Re-export common dependencies for convenience.
pub use prost;
