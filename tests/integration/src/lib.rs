//! Integration test utilities for the gateway
//!
//! This crate provides helpers for running end-to-end tests against a
//! gateway bound to a local port and backed by a seeded in-memory store.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
