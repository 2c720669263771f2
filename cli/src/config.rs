//! Run configuration.
//!
//! Settings come from command-line flags, the environment, or a `.env` file,
//! and are checked with `validator` before any network activity.

use client::{PushOptions, TransportIdentity};
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_tls_material"))]
pub struct Settings {
    /// Base URL of the ingestion endpoint.
    #[validate(
        url(message = "must be an absolute http or https URL"),
        custom(function = "validate_http_scheme")
    )]
    pub url: String,
    /// Snappy-compress the payload.
    pub compress: bool,
    /// Validate the server certificate.
    pub tls: bool,
    /// PEM client certificate.
    pub cert: Option<PathBuf>,
    /// PEM client private key.
    pub key: Option<PathBuf>,
    /// PEM CA bundle.
    pub ca: Option<PathBuf>,
    /// Request timeout in seconds.
    #[validate(range(min = 1, max = 3600, message = "must be between 1 and 3600 seconds"))]
    pub timeout_secs: u64,
}

fn validate_http_scheme(url: &str) -> Result<(), ValidationError> {
    let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
    if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
        Ok(())
    } else {
        Err(ValidationError::new("scheme").with_message("must use http or https".into()))
    }
}

fn validate_tls_material(settings: &Settings) -> Result<(), ValidationError> {
    if settings.tls && settings.cert.is_some() != settings.key.is_some() {
        return Err(ValidationError::new("tls_pair")
            .with_message("--cert and --key must be given together".into()));
    }
    Ok(())
}

impl Settings {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolves the transport identity from the TLS flags.
    ///
    /// Without `tls` every certificate path is ignored and a warning is logged.
    #[must_use]
    pub fn identity(&self) -> TransportIdentity {
        if !self.tls {
            let ignored: Vec<&str> = [
                ("cert", &self.cert),
                ("key", &self.key),
                ("ca", &self.ca),
            ]
            .into_iter()
            .filter_map(|(name, path)| path.as_ref().map(|_| name))
            .collect();
            if !ignored.is_empty() {
                tracing::warn!(
                    ignored = ?ignored,
                    "TLS material supplied without --tls, accepting self-signed certificates"
                );
            }
            return TransportIdentity::Insecure;
        }

        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => TransportIdentity::Mutual {
                cert: cert.clone(),
                key: key.clone(),
                ca: self.ca.clone(),
            },
            _ => TransportIdentity::ServerTrust {
                ca: self.ca.clone(),
            },
        }
    }

    /// Options for the push operation.
    #[must_use]
    pub fn push_options(&self) -> PushOptions {
        PushOptions {
            compress: self.compress,
            identity: self.identity(),
            timeout: self.timeout(),
        }
    }
}
