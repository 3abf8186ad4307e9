//! Payment channel record and lifecycle status.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a payment channel.
///
/// ```text
/// Inactive ──confirm funding──▶ Active ──settle──▶ Settled
///    │                            │
///    │ sibling activated          ├──duration elapsed──▶ Expired
///    ▼                            │
///  Invalid ◀──manual invalidate───┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    /// Created and refund-signed; funding not yet verified on the ledger.
    Inactive,
    /// Funding verified; chunks may be recorded and paid.
    Active,
    /// Abandoned before activation, or manually voided.
    Invalid,
    /// Cooperatively closed; settlement transaction submitted.
    Settled,
    /// Duration elapsed unsettled; the buyer's pre-signed timelocked refund
    /// is the remaining recovery path.
    Expired,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Inactive => "INACTIVE",
            ChannelStatus::Active => "ACTIVE",
            ChannelStatus::Invalid => "INVALID",
            ChannelStatus::Settled => "SETTLED",
            ChannelStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INACTIVE" => Some(ChannelStatus::Inactive),
            "ACTIVE" => Some(ChannelStatus::Active),
            "INVALID" => Some(ChannelStatus::Invalid),
            "SETTLED" => Some(ChannelStatus::Settled),
            "EXPIRED" => Some(ChannelStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A two-party unidirectional payment channel.
///
/// `amount` is fixed at creation; only `status`, `consumed_tokens`,
/// timestamps and the transaction/hash artifact fields mutate afterward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentChannel {
    pub channel_id: String,
    pub user_id: String,
    /// Channel capacity in ledger base units.
    pub amount: u64,
    /// Cooperative window: relative timelock on the refund, in seconds.
    pub duration_secs: u64,
    pub status: ChannelStatus,
    /// Monotonic metered-token counter, independent of payment confirmation.
    pub consumed_tokens: u64,
    /// At most one ACTIVE default channel per user.
    pub is_default: bool,
    /// Seller's pre-signature over the refund transaction.
    pub seller_signature: Option<Vec<u8>>,
    /// Serialized refund transaction (buyer's timelocked fallback).
    pub refund_tx: Option<Vec<u8>>,
    /// Serialized funding transaction.
    pub funding_tx: Option<Vec<u8>>,
    /// Serialized settlement transaction, recorded on cooperative close.
    pub settle_tx: Option<Vec<u8>>,
    /// Ledger hash of the confirmed funding transaction.
    pub tx_hash: Option<[u8; 32]>,
    /// Ledger hash of the submitted settlement transaction.
    pub settle_hash: Option<[u8; 32]>,
    pub created_at: u64,
    pub verified_at: Option<u64>,
    pub updated_at: u64,
}

impl PaymentChannel {
    /// Unix timestamp at which the channel's duration elapses.
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.duration_secs)
    }

    /// Whole seconds until expiry, zero if already elapsed.
    pub fn seconds_until_expiry(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }
}
