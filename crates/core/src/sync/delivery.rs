//! One bounded attempt to deliver a write, mapped into the replay taxonomy.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::sync::classifier::classify;
use crate::sync::errors::ReplayError;
use crate::sync::ports::{TransportResponse, WriteRequest, WriteTransport};

/// Send `request`, treating an elapsed `timeout` as a network failure.
///
/// 2xx responses are returned as-is. Everything else becomes a
/// [`ReplayError`]: conflict-shaped 4xx responses carry their classified
/// kind, 5xx (and 408/429) are transient, other 4xx are validation failures.
pub async fn deliver(
    transport: &dyn WriteTransport,
    request: &WriteRequest,
    timeout: Duration,
) -> Result<TransportResponse, ReplayError> {
    let response = match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => return Err(ReplayError::Timeout(timeout)),
    };

    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    debug!(status, endpoint = %request.endpoint, "Write rejected by server");

    if status >= 500 || matches!(status, 408 | 429) {
        return Err(ReplayError::Server {
            status,
            message: server_message(response.body.as_ref(), status),
        });
    }

    let classification = classify(status, response.body.as_ref());
    if classification.conflict_shaped {
        return Err(ReplayError::Conflict {
            kind: classification.kind,
            status,
            info: classification.info,
        });
    }

    Err(ReplayError::Validation { status, message: server_message(response.body.as_ref(), status) })
}

fn server_message(body: Option<&Value>, status: u16) -> String {
    body.and_then(|b| {
        ["message", "error", "detail"]
            .iter()
            .find_map(|key| b.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    })
    .unwrap_or_else(|| format!("HTTP {status}"))
}
