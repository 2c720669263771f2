//! Liveness probe.
//!
//! Reachability is a transport question: any HTTP status, 4xx and 5xx
//! included, means the endpoint is up. Only a failure to get a response at
//! all makes it unreachable.

use crate::outcome::TransportFailure;
use crate::publish_url;
use crate::tls::{build_client, TransportIdentity};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Result of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The endpoint answered with some HTTP status.
    Reachable {
        /// The status it answered with.
        status: u16,
    },
    /// No HTTP response was received.
    Unreachable {
        /// Why.
        failure: TransportFailure,
    },
}

impl ProbeOutcome {
    /// Returns true if the endpoint answered.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reachable { status } => write!(f, "reachable (HTTP {status})"),
            Self::Unreachable { failure } => write!(f, "unreachable: {failure}"),
        }
    }
}

/// Sends a body-less `GET {url}/publish/metrics`.
///
/// The server certificate is not validated, matching a self-signed local
/// setup.
pub async fn probe(url: &str, timeout: Duration) -> ProbeOutcome {
    let endpoint = publish_url(url);
    let client = match build_client(&TransportIdentity::Insecure, timeout) {
        Ok(client) => client,
        Err(err) => {
            return ProbeOutcome::Unreachable {
                failure: err.into(),
            }
        }
    };

    tracing::debug!(%endpoint, timeout_secs = timeout.as_secs_f64(), "Probing ingestion endpoint");

    match client.get(&endpoint).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            tracing::info!(%endpoint, status, "Ingestion endpoint is responding");
            ProbeOutcome::Reachable { status }
        }
        Err(err) => {
            let failure = TransportFailure::from_reqwest(&err);
            tracing::error!(
                %endpoint,
                kind = %failure.kind,
                detail = %failure.detail,
                "Ingestion endpoint is unreachable"
            );
            ProbeOutcome::Unreachable { failure }
        }
    }
}
