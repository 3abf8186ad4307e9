//! # tollgate-channel
//!
//! The payment-channel protocol engine: channel lifecycle state machine,
//! the chunk-level consumption/payment ledger, and seller-side settlement.
//!
//! ## Modules
//!
//! - [`manager`] — channel lifecycle (create / confirm funding / default /
//!   invalidate / expire)
//! - [`metering`] — chunk recording under streaming and payment attachment
//! - [`settle`] — cooperative close from the latest paid chunk

pub mod manager;
pub mod metering;
pub mod settle;

#[cfg(test)]
pub(crate) mod testutil;

pub use manager::{ChannelManager, CreatedChannel};
pub use metering::StreamSession;
pub use settle::SettlementOutcome;

/// Error types for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Malformed or missing required fields. Not retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller identity does not match the channel owner. Never a silent
    /// no-op.
    #[error("access denied: user {user_id} does not own channel {channel_id}")]
    AccessDenied { user_id: String, channel_id: String },

    /// Illegal lifecycle transition for the currently persisted status.
    #[error("state error: {0}")]
    State(String),

    /// Recovery-bit mismatch or other signing failure. Fatal, never
    /// retried.
    #[error(transparent)]
    Signing(#[from] tollgate_crypto::CryptoError),

    /// Transaction construction/witness failure.
    #[error(transparent)]
    Tx(#[from] tollgate_tx::TxError),

    /// Ledger submission or lookup failure. Retryable by the caller or the
    /// next sweeper tick.
    #[error(transparent)]
    Ledger(#[from] tollgate_ledger::LedgerError),

    /// The proposed cumulative payment exceeds channel capacity. The chunk
    /// stays recorded but unpayable; the stream is not aborted.
    #[error("insufficient balance: cumulative payment {cumulative_payment} exceeds capacity {channel_amount}")]
    InsufficientBalance {
        cumulative_payment: u64,
        channel_amount: u64,
    },

    /// Settlement requested with no paid chunk to settle from.
    #[error("no paid chunk available for settlement")]
    NoPayment,

    /// The canonical chunk is missing its transaction data or buyer
    /// signature.
    #[error("incomplete settlement artifact: {0}")]
    IncompleteArtifact(String),

    /// Persistence failure.
    #[error(transparent)]
    Db(#[from] tollgate_db::DbError),

    /// Artifact encoding/decoding failure.
    #[error(transparent)]
    Codec(#[from] tollgate_types::CodecError),
}

/// Convenience result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
