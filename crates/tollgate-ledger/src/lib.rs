//! # tollgate-ledger
//!
//! The seam between the channel engine and the ledger node. Everything
//! network-bound goes through the [`LedgerClient`] trait; calls are wrapped
//! with a timeout and surface as retryable errors, never silently dropped.
//!
//! ## Modules
//!
//! - [`rpc`] — JSON-RPC client speaking to a ledger node over TCP
//! - [`mock`] — in-memory ledger double for tests

pub mod mock;
pub mod rpc;

use std::time::Duration;

use async_trait::async_trait;

use tollgate_types::tx::{LiveCell, Script, Transaction};
use tollgate_types::TxHash;

/// Error types for ledger interaction.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The call did not complete within the configured timeout. Retryable.
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    /// The node rejected the submission. Retryable by the caller or the
    /// next sweeper tick.
    #[error("ledger rejected transaction: {0}")]
    Rejected(String),

    /// Transport-level failure reaching the node. Retryable.
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// Artifact could not be encoded/decoded for the wire.
    #[error(transparent)]
    Codec(#[from] tollgate_types::CodecError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Client interface to the ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Broadcast a transaction; returns its hash on acceptance.
    async fn submit_transaction(&self, tx: &Transaction) -> Result<TxHash>;

    /// Fetch an on-ledger transaction by hash, if known.
    async fn get_transaction(&self, hash: &TxHash) -> Result<Option<Transaction>>;

    /// Live cells under `lock` with at least `min_capacity` total, for fee
    /// completion.
    async fn find_spendable_cells(&self, lock: &Script, min_capacity: u64)
        -> Result<Vec<LiveCell>>;
}

/// Bound a ledger call with a timeout, mapping elapse to a retryable error.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, "ledger call timed out");
            Err(LedgerError::Timeout(timeout))
        }
    }
}
