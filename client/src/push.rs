//! Metric push.
//!
//! One `POST {url}/publish/metrics` per call. No retries: a failed attempt
//! is final.

use crate::compression::{encode_body, CompressionStatus};
use crate::outcome::{DeliveryAttempt, DeliveryOutcome, TransportFailure};
use crate::publish_url;
use crate::request::DeliveryRequest;
use crate::tls::{build_client, TransportIdentity};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for a single push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushOptions {
    /// Snappy-compress the body.
    pub compress: bool,
    /// Server validation and client certificate mode.
    pub identity: TransportIdentity,
    /// Upper bound on the whole exchange.
    #[serde(rename = "timeout_secs", serialize_with = "as_secs")]
    pub timeout: Duration,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            compress: false,
            identity: TransportIdentity::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn as_secs<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(timeout.as_secs_f64())
}

/// Everything observed during one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// Full ingestion URL.
    pub endpoint: String,
    /// When the push started.
    pub started_at: DateTime<Utc>,
    /// Serialized size before compression.
    pub payload_bytes: usize,
    /// Size of the body actually sent.
    pub body_bytes: usize,
    /// What happened to the compression request.
    pub compression: CompressionStatus,
    /// Final delivery result.
    pub outcome: DeliveryOutcome,
}

/// Pushes a serialized payload to `{url}/publish/metrics`.
pub async fn push(url: &str, payload: Vec<u8>, options: &PushOptions) -> PushReport {
    let endpoint = publish_url(url);
    let started_at = Utc::now();
    let payload_bytes = payload.len();
    let body = encode_body(payload, options.compress);
    let body_bytes = body.bytes.len();
    let compression = body.status.clone();

    let report = |outcome: DeliveryOutcome| PushReport {
        endpoint: endpoint.clone(),
        started_at,
        payload_bytes,
        body_bytes,
        compression: compression.clone(),
        outcome,
    };

    let request = DeliveryRequest::new(
        endpoint.clone(),
        body,
        options.identity.clone(),
        options.timeout,
    );

    let attempt = DeliveryAttempt::new();
    let client = match build_client(&request.identity, request.timeout) {
        Ok(client) => client,
        Err(err) => {
            let failure = TransportFailure::from(err);
            tracing::error!(%endpoint, detail = %failure.detail, "Failed to set up transport");
            return report(attempt.abort(failure));
        }
    };

    tracing::info!(
        %endpoint,
        body_bytes,
        content_encoding = ?request.headers.get(reqwest::header::CONTENT_ENCODING),
        tls = request.identity.describe(),
        "Sending metrics"
    );

    let in_flight = attempt.dispatch();
    let outcome = match request.into_post(&client).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            // The status decides the outcome even if the body is cut short.
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    let failure = TransportFailure::from_reqwest(&err);
                    tracing::warn!(
                        status,
                        detail = %failure.detail,
                        "Failed to read response body"
                    );
                    format!("<unreadable response body: {}>", failure.detail)
                }
            };
            in_flight.received(status, text)
        }
        Err(err) => in_flight.failed(TransportFailure::from_reqwest(&err)),
    };

    match &outcome {
        DeliveryOutcome::Delivered { status, latency, .. } => {
            tracing::info!(status, latency_ms = latency.as_secs_f64() * 1000.0, "Metrics pushed");
        }
        DeliveryOutcome::RejectedByServer { status, body, .. } => {
            tracing::error!(status, %body, "Ingestion endpoint rejected metrics");
        }
        DeliveryOutcome::Failed { failure, .. } => {
            tracing::error!(
                kind = %failure.kind,
                detail = %failure.detail,
                "Failed to push metrics"
            );
        }
    }

    report(outcome)
}
