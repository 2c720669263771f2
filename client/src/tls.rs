//! Transport identity and HTTP client construction.
//!
//! A `TransportIdentity` decides how the server certificate is checked and
//! whether a client certificate is presented. Every operation builds its own
//! client: there is no pooling across probe and push.

use crate::error::TransportError;
use reqwest::{redirect, Certificate, ClientBuilder, Identity};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the client authenticates the server and itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportIdentity {
    /// Accept any server certificate. Meant for local self-signed setups.
    #[default]
    Insecure,
    /// Validate the server against the system roots, or only `ca` if given.
    ServerTrust {
        /// PEM CA bundle replacing the system roots.
        ca: Option<PathBuf>,
    },
    /// Validate the server as in `ServerTrust` and present a client
    /// certificate.
    Mutual {
        /// PEM client certificate chain, leaf first.
        cert: PathBuf,
        /// PEM private key for the leaf certificate.
        key: PathBuf,
        /// PEM CA bundle replacing the system roots.
        ca: Option<PathBuf>,
    },
}

impl TransportIdentity {
    /// Short human-readable description of the mode.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Insecure => "accept self-signed",
            Self::ServerTrust { .. } => "strict",
            Self::Mutual { .. } => "mutual TLS",
        }
    }

    /// Applies this identity to a client builder.
    ///
    /// # Errors
    ///
    /// Returns an error if a certificate, key, or CA file cannot be read or
    /// parsed.
    pub fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, TransportError> {
        let builder = builder.use_rustls_tls();
        match self {
            Self::Insecure => Ok(builder.danger_accept_invalid_certs(true)),
            Self::ServerTrust { ca } => with_trust_root(builder, ca.as_deref()),
            Self::Mutual { cert, key, ca } => {
                let mut pem = read_material(cert)?;
                pem.push(b'\n');
                pem.extend(read_material(key)?);
                let identity =
                    Identity::from_pem(&pem).map_err(|source| TransportError::InvalidMaterial {
                        path: cert.clone(),
                        source,
                    })?;
                with_trust_root(builder.identity(identity), ca.as_deref())
            }
        }
    }
}

/// Builds a single-use HTTP client.
///
/// Redirects are not followed and idle connections are not kept, so each
/// operation performs exactly one exchange.
///
/// # Errors
///
/// Returns an error if the TLS material is unusable or the client cannot be
/// built.
pub fn build_client(
    identity: &TransportIdentity,
    timeout: Duration,
) -> Result<reqwest::Client, TransportError> {
    let builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .pool_max_idle_per_host(0);

    identity
        .apply(builder)?
        .build()
        .map_err(TransportError::Build)
}

fn with_trust_root(
    builder: ClientBuilder,
    ca: Option<&Path>,
) -> Result<ClientBuilder, TransportError> {
    let Some(path) = ca else {
        return Ok(builder);
    };
    let certificate = Certificate::from_pem(&read_material(path)?).map_err(|source| {
        TransportError::InvalidMaterial {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(builder
        .tls_built_in_root_certs(false)
        .add_root_certificate(certificate))
}

fn read_material(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::ReadMaterial {
        path: path.to_path_buf(),
        source,
    })
}
