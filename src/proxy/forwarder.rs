// src/proxy/forwarder.rs
use super::{Backend, BackendError, ProxyError, Transport};
use crate::load_balancer::BackendRegistry;
use crate::metrics::{MetricsCollector, Timer};
use crate::retry::{RetryPolicy, RetryState};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub response: Map<String, Value>,
    pub backend: Arc<Backend>,
    pub attempts: usize,
}

/// Delivers each payload to one healthy backend, failing over on error.
pub struct RequestForwarder {
    registry: Arc<BackendRegistry>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestForwarder {
    pub fn new(
        registry: Arc<BackendRegistry>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            transport,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Sends `payload` to backends in round-robin order until one answers.
    ///
    /// Every failed attempt quarantines its backend for the registry's retry
    /// downtime. Once the whole pool has failed within this dispatch the loop
    /// backs off before the next round, and it gives up with
    /// [`ProxyError::AllBackendsUnavailable`] when the attempt budget is spent.
    pub async fn dispatch(&self, payload: &Map<String, Value>) -> Result<Dispatched, ProxyError> {
        let max_attempts = self.policy.max_attempts(self.registry.len());
        let mut state = RetryState::new(self.registry.len());

        loop {
            let backend = self.registry.next_eligible();
            state.record_attempt();

            let timer = Timer::new();
            let result = self.attempt(&backend, payload).await;
            let elapsed = timer.elapsed();

            let error = match result {
                Ok(response) => {
                    self.observe_attempt(&backend, "success", elapsed);
                    debug!(
                        backend = %backend,
                        attempts = state.attempts(),
                        "backend served request"
                    );
                    return Ok(Dispatched {
                        response,
                        backend,
                        attempts: state.attempts(),
                    });
                }
                Err(error) => error,
            };

            self.observe_attempt(&backend, error.kind(), elapsed);
            warn!(
                backend = %backend,
                attempt = state.attempts(),
                %error,
                "backend attempt failed"
            );

            self.registry
                .mark_failed(&backend, self.registry.retry_downtime());
            if let Some(metrics) = &self.metrics {
                metrics.record_quarantine(backend.address());
            }

            let round_complete = state.record_failure(&backend);

            if state.attempts() >= max_attempts {
                error!(
                    attempts = state.attempts(),
                    rounds = state.rounds(),
                    "no backend could serve the request"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_exhausted();
                }
                return Err(ProxyError::AllBackendsUnavailable {
                    attempts: state.attempts(),
                });
            }

            if round_complete {
                let delay = self.policy.backoff(state.rounds());
                if !delay.is_zero() {
                    debug!(round = state.rounds(), delay = ?delay, "every backend failed, backing off");
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        backend: &Backend,
        payload: &Map<String, Value>,
    ) -> Result<Map<String, Value>, BackendError> {
        let limit = self.registry.attempt_timeout();
        match timeout(limit, self.transport.send(backend, payload)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(limit)),
        }
    }

    fn observe_attempt(&self, backend: &Backend, outcome: &str, elapsed: std::time::Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(backend.address(), outcome, elapsed);
        }
    }
}
