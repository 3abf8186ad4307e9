//! # tollgate-types
//!
//! Shared domain types used across the Tollgate workspace: the cell-model
//! transaction structures, the payment-channel and chunk records, and the
//! protocol constants every other crate agrees on.

pub mod channel;
pub mod chunk;
pub mod task;
pub mod tx;

/// Common type aliases.
pub type TxHash = [u8; 32];
pub type PubkeyHash = [u8; 20];
pub type Signature65 = [u8; 65];

/// Ledger base units charged per metered token (default; the settings table
/// may override it out-of-band).
pub const DEFAULT_EXCHANGE_RATE: u64 = 100;

/// Fixed estimated transaction fee in ledger base units. Fee-market
/// optimization is out of scope; every built transaction budgets exactly
/// this much.
pub const ESTIMATED_FEE: u64 = 1_000;

/// Length of a public key hash in lock script args.
pub const PUBKEY_HASH_LEN: usize = 20;

/// Serialized length of the 2-of-2 witness.
pub const WITNESS_LEN: usize = 132;

/// Code hash of the on-ledger 2-of-2 multisig contract.
pub const MULTISIG_CODE_HASH: [u8; 32] = [
    0x5c, 0x50, 0x69, 0xeb, 0x08, 0x57, 0xef, 0xc6, 0x5e, 0x1b, 0xca, 0x0c,
    0x07, 0xdf, 0x34, 0xc3, 0x16, 0x63, 0xb3, 0x62, 0x2f, 0xd3, 0x87, 0x6c,
    0x87, 0x63, 0x20, 0xfc, 0x96, 0x34, 0xe2, 0xa8,
];

/// Code hash of the single-signature lock used for buyer-owned outputs.
pub const SECP_CODE_HASH: [u8; 32] = [
    0x9b, 0xd7, 0xe0, 0x6f, 0x3e, 0xcf, 0x4b, 0xe0, 0xf2, 0xfc, 0xd2, 0x18,
    0x8b, 0x23, 0xf1, 0xb9, 0xfc, 0xc8, 0x8e, 0x5d, 0x4b, 0x65, 0xa8, 0x63,
    0x7b, 0x17, 0x72, 0x3b, 0xbd, 0xa3, 0xcc, 0xe8,
];

/// Error type for canonical encoding/decoding of ledger artifacts.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Get the current Unix timestamp in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
