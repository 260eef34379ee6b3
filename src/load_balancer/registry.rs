// src/load_balancer/registry.rs
use super::round_robin::RoundRobinCursor;
use crate::config::{check_backend_addresses, Config, ConfigError, MAX_RETRY_DOWNTIME};
use crate::proxy::Backend;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_RETRY_DOWNTIME: Duration = Duration::from_secs(10);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Fixed, ordered pool of backends plus the quarantine table.
///
/// Selection and failure marking each take one short lock over the cursor and
/// the quarantine map. Expired quarantine entries are never removed; they are
/// ignored at selection time and overwritten by the next failure.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    state: Mutex<SelectionState>,
    retry_downtime: Duration,
    attempt_timeout: Duration,
}

#[derive(Debug)]
struct SelectionState {
    cursor: RoundRobinCursor,
    /// address -> instant the backend becomes eligible again
    quarantine: HashMap<String, Instant>,
}

/// Point-in-time view of one backend, in pool order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BackendStatus {
    pub address: String,
    pub quarantined: bool,
    pub eligible_in_secs: f64,
}

impl BackendRegistry {
    pub fn new(
        addresses: &[String],
        retry_downtime: Duration,
        attempt_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if addresses.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        check_backend_addresses(addresses)?;

        let backends = addresses
            .iter()
            .map(|address| Backend::parse(address).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            state: Mutex::new(SelectionState {
                cursor: RoundRobinCursor::new(backends.len()),
                quarantine: HashMap::new(),
            }),
            backends,
            retry_downtime,
            attempt_timeout,
        })
    }

    pub fn with_defaults(addresses: &[String]) -> Result<Self, ConfigError> {
        Self::new(addresses, DEFAULT_RETRY_DOWNTIME, DEFAULT_ATTEMPT_TIMEOUT)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            &config.backend_addresses,
            config.retry_downtime()?,
            config.attempt_timeout()?,
        )
    }

    // Pools are never empty, so there is no `is_empty`.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn retry_downtime(&self) -> Duration {
        self.retry_downtime
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Next backend in round-robin order that is not quarantined.
    ///
    /// If the whole pool is quarantined the backend under the cursor is
    /// returned anyway; callers must be ready for it to fail.
    pub fn next_eligible(&self) -> Arc<Backend> {
        let now = Instant::now();
        let mut state = self.lock();
        let SelectionState { cursor, quarantine } = &mut *state;

        let selection = cursor.select(|index| {
            quarantine
                .get(&self.backends[index].address)
                .map_or(true, |until| *until <= now)
        });
        drop(state);

        let backend = self.backends[selection.index].clone();
        if selection.eligible {
            if selection.skipped > 0 {
                debug!(
                    backend = %backend,
                    skipped = selection.skipped,
                    "skipped quarantined backends"
                );
            }
        } else {
            warn!(backend = %backend, "all backends quarantined, selecting best effort");
        }
        backend
    }

    /// Quarantines `backend` until `now + downtime`, replacing any earlier entry.
    /// Downtimes above [`MAX_RETRY_DOWNTIME`] are clamped.
    pub fn mark_failed(&self, backend: &Backend, downtime: Duration) {
        if !self.backends.iter().any(|b| b.address == backend.address) {
            warn!(backend = %backend, "ignoring failure for backend outside the pool");
            return;
        }

        let downtime = downtime.min(MAX_RETRY_DOWNTIME);
        let Some(until) = Instant::now().checked_add(downtime) else {
            warn!(backend = %backend, downtime = ?downtime, "quarantine deadline overflows the clock");
            return;
        };
        self.lock().quarantine.insert(backend.address.clone(), until);
        debug!(backend = %backend, downtime = ?downtime, "backend quarantined");
    }

    pub fn is_quarantined(&self, backend: &Backend) -> bool {
        let now = Instant::now();
        self.lock()
            .quarantine
            .get(&backend.address)
            .map_or(false, |until| *until > now)
    }

    pub fn snapshot(&self) -> Vec<BackendStatus> {
        let now = Instant::now();
        let state = self.lock();

        self.backends
            .iter()
            .map(|backend| {
                let remaining = state
                    .quarantine
                    .get(&backend.address)
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or_default();
                BackendStatus {
                    address: backend.address.clone(),
                    quarantined: !remaining.is_zero(),
                    eligible_in_secs: remaining.as_secs_f64(),
                }
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, SelectionState> {
        // The state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
