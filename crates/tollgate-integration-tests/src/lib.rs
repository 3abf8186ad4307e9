//! Integration test crate for the tollgate payment channel service.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end channel flows across multiple workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tollgate-integration-tests
//! ```
