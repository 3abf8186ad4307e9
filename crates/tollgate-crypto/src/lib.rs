//! # tollgate-crypto
//!
//! ECDSA signing over secp256k1 in the recovery-id form the ledger's lock
//! scripts verify: a fixed 65-byte signature (`r(32) || s(32) || recovery
//! byte`) from which the verifier reconstructs the signer's public key.
//!
//! ## Modules
//!
//! - [`secp`] — key wrapper, recoverable signing, timelock-bound signing

pub mod secp;

pub use secp::{pubkey_hash, recover_pubkey, Keypair};

/// Error types for signing operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature bytes could not be parsed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// No recovery id reproduced the signer's own public key. Indicates
    /// corrupted key material; fatal, never retried.
    #[error("no recovery id matches the signing key")]
    RecoveryMismatch,

    /// Key file I/O failure.
    #[error("key file error: {0}")]
    KeyFile(String),
}

/// Convenience result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
