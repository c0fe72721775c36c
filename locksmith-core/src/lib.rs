//! Locksmith — named advisory locks over TCP.
//!
//! # Overview
//!
//! Locksmith hands out mutually-exclusive, named, advisory locks to remote
//! clients over a small length-prefixed binary protocol, optionally behind
//! TLS. A client asks for a lock by a UTF-8 tag and is notified the moment
//! the lock is its own; releasing hands the lock to the next waiter in FIFO
//! order, and a disconnect releases everything the client held.
//!
//! All state is in memory and scoped to one process. There are no leases:
//! a lock is held until its owner releases it or goes away.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use locksmith_core::{config::Config, Locksmith};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     locksmith_core::logging::init(&config.logging);
//!     Locksmith::bind(config).await?.run().await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`engine`] - the lock table, sharded over single-threaded workers so
//!   that actions for one tag never race
//! - [`server`] - TCP/TLS acceptor and the per-connection session adapter
//! - [`protocol`] - the wire codec
//! - [`config`] - environment-variable configuration surface
//! - [`metrics`] - Prometheus counters and the scrape endpoint
//! - [`client`] - a sample asynchronous client

pub mod client;
pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod server;

// Re-exports of main types
pub use client::Client;
pub use config::Config;
pub use engine::{Engine, Rejection};
pub use server::Locksmith;
