//! LnBridge Relayer - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod api;
pub mod bridge;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod execution;
pub mod fee;
pub mod hash;
pub mod indexer;
pub mod metrics;
pub mod permit;
pub mod relayer;
pub mod route;
pub mod secret;
pub mod store;
pub mod tracker;
pub mod types;
