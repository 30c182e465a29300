//! Shared library for cross-cutting concerns in the AWS connector crates.
//!
//! This crate provides centralized implementations for:
//! - A duration-bounded retrier with pluggable pacing and observers
//! - A bounded poll for "wait until the fetched state matches" loops
//! - Prometheus metrics helpers
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod retry;
pub mod poll;
pub mod metrics;
pub mod tracing_config;

pub use retry::{
    DelayListener, ExponentialBackoffListener, Retrier, RetrierEventListener, RetryConfig,
    RetryTimeout, TracingListener,
};
pub use poll::{BoundedPoll, PollError, Probe};
pub use metrics::{Counter, Gauge};
pub use tracing_config::{TracingConfig, init_tracing};
