//! Cupchain Mining Client
//!
//! A proof-of-work mining client for the Cupchain network:
//! - Parallel CPU nonce search with cooperative cancellation
//! - Block submission with bounded retry and a recent-accept dedup window
//! - Peer relay of accepted blocks
//! - Local account-balance ledger with an external mirror outbox
//! - Best-effort chain snapshot caching and hash-rate telemetry

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod miner;
pub mod stats;
pub mod submit;
pub mod sync;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "cupchain-mining-client";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
