//! demos/stub_backend.rs
//! Run: cargo run --example stub_backend -- <port> [echo|alternate|slow]
//!
//! A JSON echo service to put behind the balancer:
//!   echo       answers every request with its own body
//!   alternate  fails every other request with a 500
//!   slow       waits SLOW_SECS (default 5) before answering

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Echo,
    Alternate,
    Slow(Duration),
}

#[derive(Clone)]
struct BackendState {
    port: u16,
    mode: Mode,
    req_counter: Arc<AtomicU64>,
}

async fn handle(req: Request<Body>, state: BackendState) -> Result<Response<Body>, Infallible> {
    let n = state.req_counter.fetch_add(1, Ordering::SeqCst);

    if req.method() != hyper::Method::POST {
        return Ok(status(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"));
    }

    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(_) => return Ok(status(StatusCode::BAD_REQUEST, "Bad Request")),
    };

    match state.mode {
        Mode::Echo => {}
        Mode::Alternate => {
            if n % 2 == 0 {
                println!("[{}] request {} -> injected failure", state.port, n);
                return Ok(status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"));
            }
        }
        Mode::Slow(delay) => sleep(delay).await,
    }

    println!("[{}] request {} -> echo", state.port, n);
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn status(code: StatusCode, text: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = code;
    response
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8001".into())
        .parse()?;

    let slow_secs = std::env::var("SLOW_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let mode = match std::env::args().nth(2).as_deref() {
        None | Some("echo") => Mode::Echo,
        Some("alternate") => Mode::Alternate,
        Some("slow") => Mode::Slow(Duration::from_secs(slow_secs)),
        Some(other) => anyhow::bail!("unknown mode {:?}", other),
    };

    let state = BackendState {
        port,
        mode,
        req_counter: Arc::new(AtomicU64::new(0)),
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let make_svc = make_service_fn(move |_conn| {
        let st = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, st.clone()))) }
    });

    println!("Stub backend on http://{}  [mode={:?}]", addr, mode);

    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
