// src/proxy/error.rs
use hyper::{header, Body, Response, StatusCode};
use serde_json::json;

/// Failures a client can observe. Individual backend failures never surface.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("all backends unavailable after {attempts} attempts")]
    AllBackendsUnavailable { attempts: usize },

    #[error("invalid request payload: {0}")]
    InvalidPayload(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::AllBackendsUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let body = json!({ "error": err.to_string() }).to_string();

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = err.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        response
    }
}
