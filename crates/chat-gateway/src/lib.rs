//! # chat-gateway
//!
//! WebSocket gateway for real-time events.
//!
//! ## Overview
//!
//! - [`protocol`]: wire format (opcodes, events, intents, close codes)
//! - [`connection`]: sessions, the session registry and the socket run loop
//! - [`presence`]: reference-counted online status per user
//! - [`broadcast`]: domain event fan-out and the Redis bridge
//! - [`server`]: HTTP upgrade endpoint and process lifecycle

pub mod broadcast;
pub mod connection;
pub mod presence;
pub mod protocol;
pub mod server;

pub use server::run;
