//! Recoverable secp256k1 signing.
//!
//! The ledger's multisig script verifies signatures by public-key recovery:
//! it reconstructs a key from the 65-byte signature and compares its hash
//! against the script args. The signing primitive alone does not reveal
//! which of the four candidate recovery ids is correct, so [`Keypair::sign_recoverable`]
//! recovers the key for each candidate and selects the one that reproduces
//! the signer's own public key.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroize;

use tollgate_types::tx::since_relative_seconds;
use tollgate_types::{PubkeyHash, Signature65, PUBKEY_HASH_LEN};

use crate::{CryptoError, Result};

/// A secp256k1 signing key pair.
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
            public: self.public,
        }
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .finish()
    }
}

impl Keypair {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let secret = SecretKey::new(&mut rand::thread_rng());
        let public = PublicKey::from_secret_key(&secp, &secret);
        Self { secret, public }
    }

    /// Create a key from raw secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    /// Load a key from a file containing the 32-byte secret as hex. The
    /// decoded buffer is wiped before returning.
    pub fn from_hex_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        let mut raw = hex::decode(content.trim())
            .map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        let result = match <[u8; 32]>::try_from(raw.as_slice()) {
            Ok(mut bytes) => {
                let key = Self::from_bytes(&bytes);
                bytes.zeroize();
                key
            }
            Err(_) => Err(CryptoError::KeyFile("expected 32 hex-encoded bytes".into())),
        };
        raw.zeroize();
        result
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Hash of the compressed public key, as embedded in lock script args.
    pub fn pubkey_hash(&self) -> PubkeyHash {
        pubkey_hash(&self.public)
    }

    /// Sign a 32-byte message hash, producing `r || s || recovery_id`.
    ///
    /// The recovery byte is found by brute force: for each candidate id,
    /// recover the public key and compare against our own. A correctly
    /// derived key pair always matches one candidate; none matching means
    /// the key material is corrupt and signing must not proceed.
    pub fn sign_recoverable(&self, message_hash: &[u8; 32]) -> Result<Signature65> {
        let secp = Secp256k1::new();
        let message = Message::from_digest(*message_hash);
        let compact = secp.sign_ecdsa(&message, &self.secret).serialize_compact();

        for candidate in 0..4 {
            let rec_id = match RecoveryId::from_i32(candidate) {
                Ok(id) => id,
                Err(_) => continue,
            };
            let rec_sig = match RecoverableSignature::from_compact(&compact, rec_id) {
                Ok(sig) => sig,
                Err(_) => continue,
            };
            if let Ok(recovered) = secp.recover_ecdsa(&message, &rec_sig) {
                if recovered == self.public {
                    let mut out = [0u8; 65];
                    out[..64].copy_from_slice(&compact);
                    out[64] = candidate as u8;
                    return Ok(out);
                }
            }
        }

        Err(CryptoError::RecoveryMismatch)
    }

    /// Sign a message hash bound to a relative timelock.
    ///
    /// The 8-byte little-endian `since` value (relative flag + duration in
    /// seconds) is folded into the digest, so the refund signature commits
    /// to its specific unlock delay.
    pub fn sign_with_relative_timelock(
        &self,
        message_hash: &[u8; 32],
        duration_secs: u64,
    ) -> Result<Signature65> {
        let digest = timelock_digest(message_hash, duration_secs);
        self.sign_recoverable(&digest)
    }
}

/// Digest binding a transaction hash to a relative timelock.
pub fn timelock_digest(message_hash: &[u8; 32], duration_secs: u64) -> [u8; 32] {
    let since = since_relative_seconds(duration_secs);
    let mut hasher = blake3::Hasher::new();
    hasher.update(message_hash);
    hasher.update(&since.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Hash of a compressed public key: first 20 bytes of BLAKE3.
pub fn pubkey_hash(public: &PublicKey) -> PubkeyHash {
    let digest = blake3::hash(&public.serialize());
    let mut out = [0u8; PUBKEY_HASH_LEN];
    out.copy_from_slice(&digest.as_bytes()[..PUBKEY_HASH_LEN]);
    out
}

/// Recover the public key from a 65-byte signature, as the ledger's
/// verifier does.
pub fn recover_pubkey(message_hash: &[u8; 32], signature: &Signature65) -> Result<PublicKey> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*message_hash);
    let rec_id = RecoveryId::from_i32(i32::from(signature[64]))
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let rec_sig = RecoverableSignature::from_compact(&signature[..64], rec_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    secp.recover_ecdsa(&message, &rec_sig)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}
