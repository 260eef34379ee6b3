// src/main.rs
use anyhow::{Context, Result};
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use roundrobin_failover::{
    config::{self, Config},
    load_balancer::BackendRegistry,
    metrics::MetricsRegistry,
    proxy::{HttpTransport, RequestForwarder},
    retry::RetryPolicy,
    server::{RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roundrobin_failover=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config = load_configuration().await?;
    info!(
        backends = config.backend_addresses.len(),
        retry_downtime_secs = config.retry_downtime_secs,
        per_attempt_timeout_secs = config.per_attempt_timeout_secs,
        "configuration loaded"
    );

    let registry = Arc::new(BackendRegistry::from_config(&config)?);
    let transport = Arc::new(HttpTransport::new().context("Failed to create HTTP client")?);

    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();
    metrics.update_backends(&registry.snapshot());

    let forwarder = Arc::new(
        RequestForwarder::new(
            registry.clone(),
            transport,
            RetryPolicy::new(config.retry.clone()),
        )
        .with_metrics(metrics.clone()),
    );

    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(
            metrics_addr,
            metrics_registry,
            registry.clone(),
            config.metrics.path.clone(),
        )?;
    }

    let handler = RequestHandler::new(forwarder).with_metrics(metrics);

    info!("Starting load balancer on {}", config.listen_addr);
    ServerBuilder::new(config.listen_addr)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// The first CLI argument names a YAML or JSON file; without one the
/// configuration comes from `LB_*` environment variables.
async fn load_configuration() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            config::load_config(Path::new(&path)).await
        }
        None => {
            info!("No config file given, reading {}_* environment variables", config::ENV_PREFIX);
            config::load_from_env()
        }
    }
}

fn start_metrics_server(
    addr: SocketAddr,
    metrics: MetricsRegistry,
    registry: Arc<BackendRegistry>,
    path: String,
) -> Result<()> {
    let metrics = Arc::new(metrics);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let metrics = metrics.clone();
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let mut response = Response::new(Body::empty());
                    if req.uri().path() != path.as_str() {
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        *response.body_mut() = Body::from("Not Found");
                        return Ok::<_, Infallible>(response);
                    }

                    metrics.collector().update_backends(&registry.snapshot());
                    match metrics.gather() {
                        Ok(text) => {
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            *response.body_mut() = Body::from(text);
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                        }
                    }
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
