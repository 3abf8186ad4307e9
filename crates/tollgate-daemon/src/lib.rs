//! # tollgate-daemon
//!
//! Composition root for the seller-side channel service: configuration,
//! sweep bodies, and the interval scheduler. The binary in `main.rs` wires
//! these to a real ledger node and key file.
//!
//! ## Modules
//!
//! - [`config`] — TOML configuration with serde defaults
//! - [`sweep`] — auto-settle and expire sweep bodies
//! - [`scheduler`] — interval loops with broadcast shutdown

pub mod config;
pub mod scheduler;
pub mod sweep;
