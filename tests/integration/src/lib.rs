//! Integration test utilities for the chat gateway
//!
//! This crate provides helpers for running end-to-end tests against a
//! gateway served over real WebSockets.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
