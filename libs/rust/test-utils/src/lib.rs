//! Shared test utilities for the AWS connector libraries.
//!
//! This crate provides:
//! - Proptest generators for credentials and connection parameters
//! - A simulated provider account and an in-memory connection store
//! - Test fixtures with sample connections

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{InMemoryConnectionStore, MockAwsProvider};
