// src/retry/mod.rs
mod strategy;

pub use strategy::{RetryPolicy, RetryState};
