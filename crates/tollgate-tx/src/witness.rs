//! Fixed 132-byte witness layout for the 2-of-2 multisig lock.
//!
//! Layout: bytes `[0, 65)` buyer signature, `[65, 130)` seller signature,
//! byte 130 = buyer key index (0), byte 131 = seller key index (1).
//!
//! Only encoding is needed here; the ledger's script does the verifying. An
//! all-zero placeholder of the same length stands in during fee estimation
//! and must be fully overwritten before submission.

use tollgate_types::{Signature65, WITNESS_LEN};

use crate::{Result, TxError};

/// Key index of the buyer within the lock args.
const BUYER_KEY_INDEX: u8 = 0;
/// Key index of the seller within the lock args.
const SELLER_KEY_INDEX: u8 = 1;

/// The two signatures unlocking the channel's multisig output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness2of2 {
    pub buyer_sig: Signature65,
    pub seller_sig: Signature65,
}

impl Witness2of2 {
    /// Build a witness from raw signature bytes, checking lengths.
    pub fn new(buyer_sig: &[u8], seller_sig: &[u8]) -> Result<Self> {
        let buyer_sig: Signature65 = buyer_sig
            .try_into()
            .map_err(|_| TxError::InvalidWitness(format!(
                "buyer signature must be 65 bytes, got {}",
                buyer_sig.len()
            )))?;
        let seller_sig: Signature65 = seller_sig
            .try_into()
            .map_err(|_| TxError::InvalidWitness(format!(
                "seller signature must be 65 bytes, got {}",
                seller_sig.len()
            )))?;
        Ok(Self { buyer_sig, seller_sig })
    }

    /// Serialize to the fixed 132-byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(WITNESS_LEN);
        out.extend_from_slice(&self.buyer_sig);
        out.extend_from_slice(&self.seller_sig);
        out.push(BUYER_KEY_INDEX);
        out.push(SELLER_KEY_INDEX);
        out
    }

    /// All-zero stand-in used while sizing/signing, before real signatures
    /// exist.
    pub fn placeholder() -> Vec<u8> {
        vec![0u8; WITNESS_LEN]
    }

    /// Whether witness bytes are still the unfilled placeholder. Submitting
    /// one is a defect, so settlement checks this before broadcast.
    pub fn is_placeholder(bytes: &[u8]) -> bool {
        bytes.len() == WITNESS_LEN && bytes.iter().all(|&b| b == 0)
    }
}
