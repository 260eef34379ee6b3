// src/server/handler.rs
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::metrics::{MetricsCollector, Timer};
use crate::proxy::{ProxyError, RequestForwarder};

/// Header naming the backend that served the request.
pub const APP_URL_HEADER: &str = "x-app-url";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestHandler {
    forwarder: Arc<RequestForwarder>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestHandler {
    pub fn new(forwarder: Arc<RequestForwarder>) -> Self {
        Self {
            forwarder,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let timer = Timer::new();

        let response = match (req.method(), req.uri().path()) {
            (&Method::POST, "/") => self.forward(req).await,
            (&Method::GET, "/status") => self.status(),
            _ => json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" })),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_request(response.status().as_u16(), timer.elapsed());
        }
        response
    }

    async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let request_id = Uuid::new_v4();
        let span = info_span!("dispatch", %request_id);

        let mut response = match self.try_forward(req).instrument(span).await {
            Ok(response) => response,
            Err(err) => {
                if let ProxyError::InvalidPayload(_) = err {
                    warn!(%request_id, %err, "rejected request");
                }
                Response::from(err)
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }

    async fn try_forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let body = hyper::body::to_bytes(req.into_body())
            .await
            .map_err(|e| ProxyError::InvalidPayload(e.to_string()))?;
        let payload = parse_payload(&body)?;

        let dispatched = self.forwarder.dispatch(&payload).await?;

        let mut response = json_response(StatusCode::OK, &Value::Object(dispatched.response));
        match HeaderValue::from_str(dispatched.backend.address()) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(APP_URL_HEADER), value);
            }
            Err(e) => warn!(backend = %dispatched.backend, %e, "backend address is not a valid header value"),
        }
        Ok(response)
    }

    fn status(&self) -> Response<Body> {
        let backends = self.forwarder.registry().snapshot();
        json_response(StatusCode::OK, &json!({ "backends": backends }))
    }
}

fn parse_payload(body: &[u8]) -> Result<Map<String, Value>, ProxyError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(payload)) => Ok(payload),
        Ok(_) => Err(ProxyError::InvalidPayload(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(ProxyError::InvalidPayload(e.to_string())),
    }
}

fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}
