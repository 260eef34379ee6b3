// tests/load_balancer_tests.rs
use hyper::{Body, Method, Request, StatusCode};
use mockito::{Matcher, Server, ServerGuard};
use roundrobin_failover::{
    config::RetryConfig,
    load_balancer::BackendRegistry,
    proxy::{HttpTransport, RequestForwarder},
    retry::RetryPolicy,
    server::{RequestHandler, ServerBuilder, APP_URL_HEADER, REQUEST_ID_HEADER},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

// Nothing listens on port 1, so connections are refused straight away.
const REFUSED: &str = "http://127.0.0.1:1";

fn no_backoff(attempts_per_backend: u32) -> RetryConfig {
    RetryConfig {
        attempts_per_backend,
        backoff_base_ms: 0,
        backoff_max_ms: 0,
    }
}

fn handler_for(addresses: &[String], retry: RetryConfig) -> RequestHandler {
    let registry = Arc::new(
        BackendRegistry::new(addresses, Duration::from_secs(10), Duration::from_secs(2)).unwrap(),
    );
    let transport = Arc::new(HttpTransport::new().unwrap());
    let forwarder = Arc::new(RequestForwarder::new(
        registry,
        transport,
        RetryPolicy::new(retry),
    ));
    RequestHandler::new(forwarder)
}

fn post(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: hyper::Response<Body>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn echo_backend(server: &mut ServerGuard, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::Json(json!({"x": 1})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"x":1}"#)
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn test_healthy_backend_serves_request() {
    let mut backend = Server::new_async().await;
    let mock = echo_backend(&mut backend, 1).await;

    let handler = handler_for(&[backend.url()], no_backoff(2));
    let response = handler.oneshot(post(r#"{"x":1}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[APP_URL_HEADER].to_str().unwrap(),
        backend.url()
    );
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(body_json(response).await, json!({"x": 1}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_backends_are_skipped_until_downtime_ends() {
    let mut broken = Server::new_async().await;
    let broken_mock = broken
        .mock("POST", "/")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;

    let mut healthy = Server::new_async().await;
    let healthy_mock = echo_backend(&mut healthy, 2).await;

    let handler = handler_for(
        &[broken.url(), REFUSED.to_string(), healthy.url()],
        no_backoff(2),
    );

    for _ in 0..2 {
        let response = handler.clone().oneshot(post(r#"{"x":1}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[APP_URL_HEADER].to_str().unwrap(),
            healthy.url()
        );
    }

    broken_mock.assert_async().await;
    healthy_mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_response_triggers_failover() {
    let mut garbled = Server::new_async().await;
    let garbled_mock = garbled
        .mock("POST", "/")
        .with_status(200)
        .with_body("this is not json")
        .expect(1)
        .create_async()
        .await;

    let mut healthy = Server::new_async().await;
    let healthy_mock = echo_backend(&mut healthy, 1).await;

    let handler = handler_for(&[garbled.url(), healthy.url()], no_backoff(2));
    let response = handler.oneshot(post(r#"{"x":1}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[APP_URL_HEADER].to_str().unwrap(),
        healthy.url()
    );
    garbled_mock.assert_async().await;
    healthy_mock.assert_async().await;
}

#[tokio::test]
async fn test_all_backends_down_returns_service_unavailable() {
    let mut broken = Server::new_async().await;
    let broken_mock = broken
        .mock("POST", "/")
        .with_status(502)
        .expect(2)
        .create_async()
        .await;

    let handler = handler_for(&[broken.url(), REFUSED.to_string()], no_backoff(2));
    let response = handler.oneshot(post(r#"{"x":1}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.headers().contains_key(APP_URL_HEADER));
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("4 attempts"));
    broken_mock.assert_async().await;
}

#[tokio::test]
async fn test_non_object_payload_is_rejected_without_forwarding() {
    let mut backend = Server::new_async().await;
    let mock = echo_backend(&mut backend, 0).await;

    let handler = handler_for(&[backend.url()], no_backoff(2));
    for body in ["[1, 2, 3]", "not json", "42"] {
        let response = handler.clone().oneshot(post(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["error"].is_string());
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_status_reports_quarantined_backends() {
    let mut healthy = Server::new_async().await;
    let _mock = echo_backend(&mut healthy, 1).await;

    let handler = handler_for(&[REFUSED.to_string(), healthy.url()], no_backoff(2));
    let response = handler.clone().oneshot(post(r#"{"x":1}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = Request::builder()
        .method(Method::GET)
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = handler.clone().oneshot(status).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let backends = body["backends"].as_array().unwrap();
    assert_eq!(backends.len(), 2);
    assert_eq!(backends[0]["address"], REFUSED);
    assert_eq!(backends[0]["quarantined"], true);
    assert_eq!(backends[1]["quarantined"], false);

    let missing = Request::builder()
        .method(Method::GET)
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = handler.oneshot(missing).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_round_trip_over_tcp() {
    let mut backend = Server::new_async().await;
    let mock = echo_backend(&mut backend, 1).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(
        ServerBuilder::new(addr)
            .with_handler(handler_for(&[backend.url()], no_backoff(2)))
            .with_listener(listener)
            .serve_with_shutdown(async {
                let _ = shutdown_rx.await;
            }),
    );

    let response = reqwest::Client::new()
        .post(format!("http://{}/", addr))
        .json(&json!({"x": 1}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()[APP_URL_HEADER].to_str().unwrap(),
        backend.url()
    );
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"x": 1}));

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    mock.assert_async().await;
}
