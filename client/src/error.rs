//! Transport setup errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing the HTTP client, before any request is sent.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A certificate, key, or CA file could not be read.
    #[error("Failed to read TLS material {}: {source}", .path.display())]
    ReadMaterial {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A certificate, key, or CA file could not be parsed.
    #[error("Invalid TLS material {}: {source}", .path.display())]
    InvalidMaterial {
        /// File that could not be parsed.
        path: PathBuf,
        /// Underlying parse error.
        source: reqwest::Error,
    },

    /// The HTTP client could not be built from the TLS configuration.
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}
