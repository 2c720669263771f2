//! Integration tests for the push path.
//!
//! Tests cover:
//! - Headers and body on the wire
//! - 2xx, 3xx and 5xx classification
//! - Status kept when the response body is cut short
//! - Snappy compression
//! - Timeout, refused connection, and TLS failures

use axum::http::{header, Method, StatusCode};
use client::{
    push, serialize, CompressionStatus, DeliveryOutcome, DeliveryState, FailureKind, PushOptions,
    TransportIdentity,
};
use shared::exposition::{decode, to_wire};
use shared::fixture;
use std::path::PathBuf;
use std::time::Duration;

use super::common::{plain_text_tls_url, refused_url, truncated_response_url, FakeEndpoint};

fn fixture_payload() -> Vec<u8> {
    serialize(&fixture::build().unwrap())
}

fn options(timeout: Duration) -> PushOptions {
    PushOptions {
        timeout,
        ..PushOptions::default()
    }
}

#[tokio::test]
async fn test_push_delivered_with_empty_body() {
    let endpoint = FakeEndpoint::start(StatusCode::OK, "").await;
    let payload = fixture_payload();

    let report = push(&endpoint.base_url, payload.clone(), &PushOptions::default()).await;

    assert!(report.outcome.is_delivered(), "{:?}", report.outcome);
    assert_eq!(report.outcome.status(), Some(200));
    assert_eq!(report.outcome.body(), Some(""));
    assert!(report.outcome.latency() >= Duration::ZERO);
    assert_eq!(report.compression, CompressionStatus::Disabled);
    assert_eq!(report.payload_bytes, payload.len());
    assert_eq!(report.body_bytes, payload.len());
    assert_eq!(report.endpoint, format!("{}/publish/metrics", endpoint.base_url));
}

#[tokio::test]
async fn test_push_sends_protobuf_headers_and_body() {
    let endpoint = FakeEndpoint::start(StatusCode::OK, "accepted").await;
    let payload = fixture_payload();

    let report = push(&endpoint.base_url, payload.clone(), &PushOptions::default()).await;
    assert_eq!(report.outcome.body(), Some("accepted"));

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.headers[header::CONTENT_TYPE], "application/x-protobuf");
    assert_eq!(
        request.headers[header::CONTENT_LENGTH],
        payload.len().to_string().as_str()
    );
    assert!(request.headers.get(header::CONTENT_ENCODING).is_none());
    assert_eq!(request.body, payload);
}

#[tokio::test]
async fn test_pushed_body_decodes_to_fixture() {
    let endpoint = FakeEndpoint::start(StatusCode::OK, "").await;
    let collection = fixture::build().unwrap();

    push(&endpoint.base_url, serialize(&collection), &PushOptions::default()).await;

    let received = decode(&endpoint.requests()[0].body).unwrap();
    assert_eq!(received, to_wire(&collection));
    let names: Vec<&str> = received.iter().map(|f| f.name()).collect();
    assert!(names.contains(&"sui_node_status"));
    assert!(names.contains(&"sui_gas_used_per_transaction"));
}

#[tokio::test]
async fn test_push_rejected_by_server() {
    let endpoint = FakeEndpoint::start(StatusCode::SERVICE_UNAVAILABLE, "overloaded").await;

    let report = push(&endpoint.base_url, fixture_payload(), &PushOptions::default()).await;

    assert!(matches!(
        &report.outcome,
        DeliveryOutcome::RejectedByServer { status: 503, body, .. } if body == "overloaded"
    ));
    assert_eq!(report.outcome.state(), DeliveryState::RejectedByServer);
}

#[tokio::test]
async fn test_push_truncated_rejection_keeps_status() {
    let url = truncated_response_url("503 Service Unavailable").await;

    let report = push(&url, fixture_payload(), &options(Duration::from_secs(5))).await;

    assert_eq!(report.outcome.state(), DeliveryState::RejectedByServer, "{:?}", report.outcome);
    assert_eq!(report.outcome.status(), Some(503));
    assert!(report.outcome.body().is_some_and(|body| !body.is_empty()));
}

#[tokio::test]
async fn test_push_truncated_success_is_delivered() {
    let url = truncated_response_url("200 OK").await;

    let report = push(&url, fixture_payload(), &options(Duration::from_secs(5))).await;

    assert!(report.outcome.is_delivered(), "{:?}", report.outcome);
    assert_eq!(report.outcome.status(), Some(200));
}

#[tokio::test]
async fn test_push_redirect_is_not_followed() {
    let endpoint = FakeEndpoint::start(StatusCode::TEMPORARY_REDIRECT, "").await;

    let report = push(&endpoint.base_url, fixture_payload(), &PushOptions::default()).await;

    assert_eq!(report.outcome.state(), DeliveryState::RejectedByServer);
    assert_eq!(report.outcome.status(), Some(307));
    assert_eq!(endpoint.requests().len(), 1);
}

#[cfg(feature = "snappy")]
#[tokio::test]
async fn test_push_compressed_body_matches_encoding() {
    let endpoint = FakeEndpoint::start(StatusCode::OK, "").await;
    let payload = fixture_payload();
    let options = PushOptions {
        compress: true,
        ..PushOptions::default()
    };

    let report = push(&endpoint.base_url, payload.clone(), &options).await;

    assert!(report.outcome.is_delivered());
    assert!(matches!(report.compression, CompressionStatus::Applied { .. }));

    let request = &endpoint.requests()[0];
    assert_eq!(request.headers[header::CONTENT_ENCODING], "snappy");
    assert_eq!(
        request.headers[header::CONTENT_LENGTH],
        request.body.len().to_string().as_str()
    );
    assert_eq!(report.body_bytes, request.body.len());
    let restored = snap::raw::Decoder::new()
        .decompress_vec(&request.body)
        .unwrap();
    assert_eq!(restored, payload);
}

#[cfg(not(feature = "snappy"))]
#[tokio::test]
async fn test_push_without_codec_sends_uncompressed() {
    let endpoint = FakeEndpoint::start(StatusCode::OK, "").await;
    let payload = fixture_payload();
    let options = PushOptions {
        compress: true,
        ..PushOptions::default()
    };

    let report = push(&endpoint.base_url, payload.clone(), &options).await;

    assert!(report.outcome.is_delivered());
    assert!(report.compression.is_degraded());
    let request = &endpoint.requests()[0];
    assert!(request.headers.get(header::CONTENT_ENCODING).is_none());
    assert_eq!(request.body, payload);
}

#[tokio::test]
async fn test_push_timeout() {
    let endpoint =
        FakeEndpoint::start_with_delay(StatusCode::OK, "", Duration::from_secs(5)).await;

    let report = push(
        &endpoint.base_url,
        fixture_payload(),
        &options(Duration::from_millis(200)),
    )
    .await;

    assert_eq!(report.outcome.state(), DeliveryState::TimeoutFailure);
    assert!(report.outcome.latency() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_push_connection_refused() {
    let url = refused_url().await;

    let report = push(&url, fixture_payload(), &options(Duration::from_secs(5))).await;

    match &report.outcome {
        DeliveryOutcome::Failed { failure, .. } => {
            assert_eq!(failure.kind, FailureKind::Connection);
            assert!(!failure.detail.is_empty());
        }
        other => panic!("expected connection failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_push_tls_handshake_failure() {
    let url = plain_text_tls_url().await;

    let report = push(&url, fixture_payload(), &options(Duration::from_secs(5))).await;

    assert_eq!(report.outcome.state(), DeliveryState::TlsFailure, "{:?}", report.outcome);
}

#[tokio::test]
async fn test_push_with_missing_client_certificate() {
    let endpoint = FakeEndpoint::start(StatusCode::OK, "").await;
    let options = PushOptions {
        identity: TransportIdentity::Mutual {
            cert: PathBuf::from("/nonexistent/pushprobe/client.crt"),
            key: PathBuf::from("/nonexistent/pushprobe/client.key"),
            ca: None,
        },
        ..PushOptions::default()
    };

    let report = push(&endpoint.base_url, fixture_payload(), &options).await;

    assert_eq!(report.outcome.state(), DeliveryState::TlsFailure);
    assert_eq!(report.outcome.latency(), Duration::ZERO);
    assert!(endpoint.requests().is_empty());
}
