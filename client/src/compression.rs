//! Payload compression.
//!
//! Snappy support is a compile-time capability (the `snappy` feature). When a
//! compressed push is requested without it, the payload goes out uncompressed
//! and the caller gets `CompressionStatus::Unavailable` instead of an error.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Block compression codec for push bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Snappy raw block format.
    Snappy,
}

impl Codec {
    /// Name used in the `Content-Encoding` header.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Snappy => "snappy",
        }
    }

    /// Returns true if the codec was compiled in.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Snappy => cfg!(feature = "snappy"),
        }
    }

    /// Compresses `payload` with this codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec is not available or fails.
    pub fn compress(self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            #[cfg(feature = "snappy")]
            Self::Snappy => Ok(snap::raw::Encoder::new().compress_vec(payload)?),
            #[cfg(not(feature = "snappy"))]
            Self::Snappy => {
                let _ = payload;
                Err(CompressionError::Unavailable(self))
            }
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from compressing a payload.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The codec was not compiled in.
    #[error("{0} support is not compiled in")]
    Unavailable(Codec),

    /// The snappy encoder failed.
    #[cfg(feature = "snappy")]
    #[error("snappy compression failed: {0}")]
    Snappy(#[from] snap::Error),
}

/// What happened to a compression request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompressionStatus {
    /// Compression was not requested.
    Disabled,
    /// The body was compressed.
    Applied {
        /// Codec used, also sent as `Content-Encoding`.
        codec: Codec,
        /// Uncompressed size in bytes.
        original_bytes: usize,
        /// Compressed size in bytes.
        compressed_bytes: usize,
    },
    /// Compression was requested but the body went out uncompressed.
    Unavailable {
        /// Codec that was requested.
        codec: Codec,
        /// Why it could not be used.
        reason: String,
    },
}

impl CompressionStatus {
    /// Returns true when compression was requested but not applied.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A request body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// Bytes to send.
    pub bytes: Vec<u8>,
    /// Codec to announce in `Content-Encoding`, if any.
    pub content_encoding: Option<Codec>,
    /// Outcome of the compression request.
    pub status: CompressionStatus,
}

/// Prepares the request body, compressing it with snappy when asked to.
#[must_use]
pub fn encode_body(payload: Vec<u8>, compress: bool) -> EncodedBody {
    if !compress {
        return EncodedBody {
            bytes: payload,
            content_encoding: None,
            status: CompressionStatus::Disabled,
        };
    }

    let codec = Codec::Snappy;
    match codec.compress(&payload) {
        Ok(compressed) => {
            tracing::info!(
                codec = codec.name(),
                original_bytes = payload.len(),
                compressed_bytes = compressed.len(),
                "Compressed payload"
            );
            EncodedBody {
                status: CompressionStatus::Applied {
                    codec,
                    original_bytes: payload.len(),
                    compressed_bytes: compressed.len(),
                },
                bytes: compressed,
                content_encoding: Some(codec),
            }
        }
        Err(err) => {
            tracing::warn!(
                codec = codec.name(),
                error = %err,
                "Compression requested but unavailable, sending uncompressed"
            );
            EncodedBody {
                bytes: payload,
                content_encoding: None,
                status: CompressionStatus::Unavailable {
                    codec,
                    reason: err.to_string(),
                },
            }
        }
    }
}
