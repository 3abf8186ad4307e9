//! Chunk payment records: one row per metered unit of generated output.

use serde::{Deserialize, Serialize};

/// One discrete unit of metered consumption within a streaming session.
///
/// Rows are created continuously during streaming and never deleted; only
/// `is_paid` and the attached transaction fields transition. Within a
/// channel the most recently *paid* chunk is canonical for settlement: its
/// attached payment transaction carries the highest cumulative amount and
/// supersedes every earlier one for the same funding output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkPayment {
    pub chunk_id: String,
    pub user_id: String,
    /// One streaming turn.
    pub session_id: String,
    pub channel_id: String,
    pub tokens_count: u64,
    pub is_paid: bool,
    /// Total owed to the seller across all consumption to date, at the time
    /// this chunk was recorded. Base units, exact integer.
    pub cumulative_payment: u64,
    /// Channel capacity minus cumulative payment. Negative means the chunk
    /// overran the channel: recorded for audit, not eligible for payment.
    pub remaining_balance: i64,
    /// Buyer-signed payment transaction, attached on payment.
    pub transaction_data: Option<Vec<u8>>,
    /// Buyer's 65-byte signature over that transaction's hash.
    pub buyer_signature: Option<Vec<u8>>,
    pub created_at: u64,
}

impl ChunkPayment {
    /// Whether a payment may be attached: unpaid and within capacity.
    pub fn payable(&self) -> bool {
        !self.is_paid && self.remaining_balance >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(is_paid: bool, remaining: i64) -> ChunkPayment {
        ChunkPayment {
            chunk_id: "ck".into(),
            user_id: "u".into(),
            session_id: "s".into(),
            channel_id: "ch".into(),
            tokens_count: 10,
            is_paid,
            cumulative_payment: 1_000,
            remaining_balance: remaining,
            transaction_data: None,
            buyer_signature: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_payable() {
        assert!(chunk(false, 99_000).payable());
        assert!(!chunk(true, 99_000).payable());
        assert!(!chunk(false, -1).payable());
    }
}
