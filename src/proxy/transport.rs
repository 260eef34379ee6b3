// src/proxy/transport.rs
use super::Backend;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// Why a single attempt against one backend failed. Always recovered by
/// quarantining that backend and trying another.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("backend answered with status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout(_) => "timeout",
            BackendError::Connection(_) => "connection",
            BackendError::Status(_) => "status",
            BackendError::MalformedResponse(_) => "malformed",
        }
    }
}

/// Outbound leg of a dispatch: deliver a JSON object to one backend and
/// return its JSON object reply. Callers bound the call with a timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, backend: &Backend, payload: &Map<String, Value>)
        -> Result<Map<String, Value>, BackendError>;
}

/// Backend replies must be a JSON object.
pub fn parse_object(body: &[u8]) -> Result<Map<String, Value>, BackendError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(BackendError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(BackendError::MalformedResponse(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// POSTs the payload with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        backend: &Backend,
        payload: &Map<String, Value>,
    ) -> Result<Map<String, Value>, BackendError> {
        let response = self
            .client
            .post(backend.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        parse_object(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_objects_only() {
        assert_eq!(
            parse_object(br#"{"x":1}"#).unwrap().get("x"),
            Some(&Value::from(1))
        );
        assert!(matches!(
            parse_object(b"[1,2]"),
            Err(BackendError::MalformedResponse(msg)) if msg.contains("an array")
        ));
        assert!(matches!(
            parse_object(b"Internal Server Error"),
            Err(BackendError::MalformedResponse(_))
        ));
    }
}
