//! In-memory store for local runs and tests

mod user_store;

pub use user_store::MemoryUserStore;
