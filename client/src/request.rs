//! Delivery request assembly.

use crate::compression::EncodedBody;
use crate::tls::TransportIdentity;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use shared::exposition::CONTENT_TYPE as PROTOBUF;
use std::time::Duration;

/// Everything needed for one push exchange.
///
/// Built right before the network call and consumed by it.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Full ingestion URL.
    pub url: String,
    /// Request body, possibly compressed.
    pub body: Vec<u8>,
    /// `Content-Type`, `Content-Length`, and optional `Content-Encoding`.
    pub headers: HeaderMap,
    /// How the server and client are authenticated.
    pub identity: TransportIdentity,
    /// Upper bound on the whole exchange.
    pub timeout: Duration,
}

impl DeliveryRequest {
    /// Builds the request for an encoded body.
    #[must_use]
    pub fn new(
        url: String,
        body: EncodedBody,
        identity: TransportIdentity,
        timeout: Duration,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.bytes.len()));
        if let Some(codec) = body.content_encoding {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(codec.name()));
        }

        Self {
            url,
            body: body.bytes,
            headers,
            identity,
            timeout,
        }
    }

    /// Turns this into a POST on `client`.
    #[must_use]
    pub fn into_post(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        client
            .post(self.url)
            .headers(self.headers)
            .timeout(self.timeout)
            .body(self.body)
    }
}
