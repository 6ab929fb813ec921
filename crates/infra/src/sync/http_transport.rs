//! reqwest-backed [`WriteTransport`].

use std::time::Duration;

use async_trait::async_trait;
use fieldsync_core::{TransportError, TransportResponse, WriteRequest, WriteTransport};
use fieldsync_domain::constants::IDEMPOTENCY_KEY_HEADER;
use fieldsync_domain::FieldSyncError;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::http::HttpClient;

/// Sends queued writes to the backend as JSON.
///
/// Any HTTP status is a response, not an error; only failures to get a
/// response at all become [`TransportError`].
pub struct HttpWriteTransport {
    client: HttpClient,
    timeout: Duration,
}

impl HttpWriteTransport {
    pub fn new(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl WriteTransport for HttpWriteTransport {
    #[instrument(
        skip(self, request),
        fields(endpoint = %request.endpoint, method = %request.method)
    )]
    async fn send(&self, request: &WriteRequest) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|err| TransportError::Network(format!("invalid HTTP method: {err}")))?;

        let mut builder = self.client.request(method, &request.endpoint).json(&request.payload);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }

        let response = match self.client.send(builder).await {
            Ok(response) => response,
            Err(FieldSyncError::Timeout(_)) => return Err(TransportError::Timeout(self.timeout)),
            Err(err) => return Err(TransportError::Network(err.to_string())),
        };

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::Network(format!("failed to read response body: {err}"))
            }
        })?;

        debug!(status, bytes = text.len(), "Write response received");
        Ok(TransportResponse::new(status, parse_body(&text)))
    }
}

/// JSON bodies are parsed; any other non-empty text is kept as `message`.
fn parse_body(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(trimmed)
            .unwrap_or_else(|_| serde_json::json!({ "message": trimmed })),
    )
}
