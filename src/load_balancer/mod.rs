// src/load_balancer/mod.rs
mod registry;
mod round_robin;

pub use registry::{BackendRegistry, BackendStatus, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_RETRY_DOWNTIME};
pub use round_robin::{RoundRobinCursor, Selection};
