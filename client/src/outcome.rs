//! Delivery outcome state machine.
//!
//! An attempt moves `NotStarted -> InFlight -> terminal`. The transitions
//! consume the attempt, so a finished delivery cannot go back in flight.

use crate::error::TransportError;
use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Handshake or certificate problem, or unusable TLS material.
    Tls,
    /// Refused, reset, DNS failure, or any other connection problem.
    Connection,
    /// The configured timeout elapsed.
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "TLS failure"),
            Self::Connection => write!(f, "connection failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A classified transport failure with its full cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {detail}")]
pub struct TransportFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// The error and all of its sources.
    pub detail: String,
}

impl TransportFailure {
    /// Classifies a request error.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        Self {
            kind: classify(err),
            detail: error_chain(err),
        }
    }
}

impl From<TransportError> for TransportFailure {
    fn from(err: TransportError) -> Self {
        let kind = match err {
            TransportError::ReadMaterial { .. } | TransportError::InvalidMaterial { .. } => {
                FailureKind::Tls
            }
            TransportError::Build(_) => FailureKind::Connection,
        };
        Self {
            kind,
            detail: error_chain(&err),
        }
    }
}

/// Classifies a request error: TLS first, then timeout, then connection.
#[must_use]
pub fn classify(err: &reqwest::Error) -> FailureKind {
    if is_tls_error(err) {
        FailureKind::Tls
    } else if err.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Connection
    }
}

fn is_tls_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return true;
        }
        // io::Error hides a custom inner error from `source()`, and the TLS
        // stack nests one io::Error inside another.
        current = match e.downcast_ref::<std::io::Error>().and_then(std::io::Error::get_ref) {
            Some(inner) => Some(inner as &(dyn StdError + 'static)),
            None => e.source(),
        };
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut detail = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !detail.contains(&text) {
            detail.push_str(": ");
            detail.push_str(&text);
        }
        current = e.source();
    }
    detail
}

/// Observable state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Nothing sent yet.
    NotStarted,
    /// Request dispatched, waiting on the network.
    InFlight,
    /// The server answered 2xx.
    Delivered,
    /// The server answered with any other status.
    RejectedByServer,
    /// TLS handshake or material failure.
    TlsFailure,
    /// Connection-level failure.
    ConnectionFailure,
    /// Timeout elapsed.
    TimeoutFailure,
}

impl DeliveryState {
    /// Returns true for the final states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::NotStarted | Self::InFlight)
    }
}

/// Final result of one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// HTTP status in 200..=299.
    Delivered {
        /// Response status.
        status: u16,
        /// Time from dispatch to the full response.
        #[serde(rename = "latency_ms", serialize_with = "as_millis")]
        latency: Duration,
        /// Response body, verbatim.
        body: String,
    },
    /// Any other HTTP status, redirects included.
    RejectedByServer {
        /// Response status.
        status: u16,
        /// Time from dispatch to the full response.
        #[serde(rename = "latency_ms", serialize_with = "as_millis")]
        latency: Duration,
        /// Response body, verbatim.
        body: String,
    },
    /// No HTTP response was received.
    Failed {
        /// What went wrong.
        failure: TransportFailure,
        /// Time from dispatch to the failure; zero if never dispatched.
        #[serde(rename = "latency_ms", serialize_with = "as_millis")]
        latency: Duration,
    },
}

impl DeliveryOutcome {
    /// Returns true if the server accepted the payload.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// The terminal state this outcome represents.
    #[must_use]
    pub fn state(&self) -> DeliveryState {
        match self {
            Self::Delivered { .. } => DeliveryState::Delivered,
            Self::RejectedByServer { .. } => DeliveryState::RejectedByServer,
            Self::Failed { failure, .. } => match failure.kind {
                FailureKind::Tls => DeliveryState::TlsFailure,
                FailureKind::Connection => DeliveryState::ConnectionFailure,
                FailureKind::Timeout => DeliveryState::TimeoutFailure,
            },
        }
    }

    /// Wall-clock latency of the attempt.
    #[must_use]
    pub fn latency(&self) -> Duration {
        match self {
            Self::Delivered { latency, .. }
            | Self::RejectedByServer { latency, .. }
            | Self::Failed { latency, .. } => *latency,
        }
    }

    /// HTTP status, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Delivered { status, .. } | Self::RejectedByServer { status, .. } => Some(*status),
            Self::Failed { .. } => None,
        }
    }

    /// Response body, if a response was received.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Delivered { body, .. } | Self::RejectedByServer { body, .. } => Some(body),
            Self::Failed { .. } => None,
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered {
                status, latency, ..
            } => write!(f, "delivered (HTTP {status}) in {:.2}s", latency.as_secs_f64()),
            Self::RejectedByServer { status, body, .. } => {
                write!(f, "rejected by server (HTTP {status}): {body}")
            }
            Self::Failed { failure, .. } => write!(f, "{failure}"),
        }
    }
}

fn as_millis<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(latency.as_secs_f64() * 1000.0)
}

/// A delivery that has not been dispatched yet.
#[derive(Debug, Default)]
pub struct DeliveryAttempt {
    _private: (),
}

impl DeliveryAttempt {
    /// Starts in `NotStarted`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DeliveryState {
        DeliveryState::NotStarted
    }

    /// Marks the request as sent and starts the latency clock.
    #[must_use]
    pub fn dispatch(self) -> InFlight {
        InFlight {
            started: Instant::now(),
        }
    }

    /// Ends the attempt before anything was sent.
    #[must_use]
    pub fn abort(self, failure: TransportFailure) -> DeliveryOutcome {
        DeliveryOutcome::Failed {
            failure,
            latency: Duration::ZERO,
        }
    }
}

/// A dispatched delivery waiting on the network.
#[derive(Debug)]
pub struct InFlight {
    started: Instant,
}

impl InFlight {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> DeliveryState {
        DeliveryState::InFlight
    }

    /// Time since dispatch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finishes with an HTTP response.
    #[must_use]
    pub fn received(self, status: u16, body: String) -> DeliveryOutcome {
        let latency = self.elapsed();
        if (200..=299).contains(&status) {
            DeliveryOutcome::Delivered {
                status,
                latency,
                body,
            }
        } else {
            DeliveryOutcome::RejectedByServer {
                status,
                latency,
                body,
            }
        }
    }

    /// Finishes with a transport failure.
    #[must_use]
    pub fn failed(self, failure: TransportFailure) -> DeliveryOutcome {
        DeliveryOutcome::Failed {
            failure,
            latency: self.elapsed(),
        }
    }
}
