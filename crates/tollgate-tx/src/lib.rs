//! # tollgate-tx
//!
//! Construction of the three channel transactions — funding, refund and
//! payment — plus the 2-of-2 multisig lock script and the fixed-layout
//! witness the lock consumes.
//!
//! ## Modules
//!
//! - [`builder`] — lock script and transaction construction
//! - [`witness`] — 132-byte two-signature witness layout

pub mod builder;
pub mod witness;

pub use builder::{
    build_funding_transaction, build_payment_transaction, build_refund_transaction,
    multisig_lock,
};
pub use witness::Witness2of2;

/// Error types for transaction construction.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// Input capacity does not equal output capacity plus the fixed fee.
    /// A build-time defect, not a runtime condition.
    #[error("unbalanced transaction: inputs {inputs}, outputs {outputs}, fee {fee}")]
    Unbalanced { inputs: u64, outputs: u64, fee: u64 },

    /// Spendable cells do not cover the requested amount plus fee.
    #[error("insufficient capacity: have {available}, need {required}")]
    InsufficientCapacity { available: u64, required: u64 },

    /// The amount cannot cover the fixed fee.
    #[error("amount {amount} does not cover the fee {fee}")]
    BelowFee { amount: u64, fee: u64 },

    /// Canonical encoding/decoding failure.
    #[error(transparent)]
    Codec(#[from] tollgate_types::CodecError),

    /// Witness bytes have the wrong shape.
    #[error("invalid witness: {0}")]
    InvalidWitness(String),
}

/// Convenience result type for transaction construction.
pub type Result<T> = std::result::Result<T, TxError>;
