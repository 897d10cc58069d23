//! `{success, data?, error?}` response envelopes.

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::{FailureKind, ServiceError};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Reads a response body, refusing to buffer more than `max_bytes`.
pub(crate) async fn read_body(
    response: reqwest::Response,
    max_bytes: u64,
) -> Result<(reqwest::StatusCode, Vec<u8>), ServiceError> {
    let status = response.status();
    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(too_large(max_bytes, len));
        }
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(crate::service::map_reqwest_error)?;
        let next_len = body.len() as u64 + chunk.len() as u64;
        if next_len > max_bytes {
            return Err(too_large(max_bytes, next_len));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((status, body))
}

/// Unwraps the envelope's `data`. Non-2xx and `success: false` are both
/// errors, carrying the server's `error` text when present.
pub(crate) fn open(status: reqwest::StatusCode, body: &[u8]) -> Result<Value, ServiceError> {
    let envelope = serde_json::from_slice::<Envelope>(body);

    if !status.is_success() {
        let kind = FailureKind::HttpStatus(status.as_u16());
        return Err(match envelope.ok().and_then(|e| e.error) {
            Some(text) => ServiceError::from_server(kind, text),
            None => ServiceError::new(kind, status.to_string()),
        });
    }

    let envelope = envelope
        .map_err(|err| ServiceError::new(FailureKind::InvalidResponse, err.to_string()))?;
    if !envelope.success {
        return Err(ServiceError::from_server(
            FailureKind::Rejected,
            envelope.error.unwrap_or_default(),
        ));
    }
    Ok(envelope.data.unwrap_or(Value::Null))
}

pub(crate) fn decode<T: DeserializeOwned>(data: Value) -> Result<T, ServiceError> {
    serde_json::from_value(data)
        .map_err(|err| ServiceError::new(FailureKind::InvalidResponse, err.to_string()))
}

fn too_large(max_bytes: u64, actual: u64) -> ServiceError {
    ServiceError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}
