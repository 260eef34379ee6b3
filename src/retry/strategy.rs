// src/retry/strategy.rs

use crate::config::RetryConfig;
use crate::proxy::Backend;
use std::collections::HashSet;
use std::time::Duration;

/// Attempt budget and backoff for one dispatch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempts allowed against a pool of `pool_len` backends.
    pub fn max_attempts(&self, pool_len: usize) -> usize {
        pool_len.max(1) * self.config.attempts_per_backend.max(1) as usize
    }

    /// Exponential backoff with jitter, applied after `round` full rounds failed.
    pub fn backoff(&self, round: u32) -> Duration {
        let base = self.config.backoff_base().as_millis() as u64;
        let max = self.config.backoff_max().as_millis() as u64;

        // base * 2^(round - 1)
        let exponential = base.saturating_mul(2u64.saturating_pow(round.saturating_sub(1)));
        let capped = exponential.min(max);

        // 0-25% jitter
        let jitter = (capped as f64 * rand::random::<f64>() * 0.25) as u64;

        Duration::from_millis(capped + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Per-dispatch bookkeeping of failed attempts.
#[derive(Debug)]
pub struct RetryState {
    pool_len: usize,
    attempts: usize,
    rounds: u32,
    failed_this_round: HashSet<String>,
}

impl RetryState {
    pub fn new(pool_len: usize) -> Self {
        Self {
            pool_len,
            attempts: 0,
            rounds: 0,
            failed_this_round: HashSet::new(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Records a failure and returns true when it completes a round, i.e.
    /// every backend in the pool has now failed during this round.
    pub fn record_failure(&mut self, backend: &Backend) -> bool {
        self.failed_this_round.insert(backend.address.clone());
        if self.failed_this_round.len() >= self.pool_len {
            self.failed_this_round.clear();
            self.rounds += 1;
            true
        } else {
            false
        }
    }
}
