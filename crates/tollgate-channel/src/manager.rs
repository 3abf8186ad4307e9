//! Channel lifecycle management.
//!
//! All transitions are guarded by the persisted status at write time; a
//! losing concurrent writer observes a stale-state error, never a corrupted
//! record. Every user-facing mutation checks ownership first.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use tollgate_crypto::Keypair;
use tollgate_db::queries::channels;
use tollgate_ledger::{with_timeout, LedgerClient};
use tollgate_types::channel::{ChannelStatus, PaymentChannel};
use tollgate_types::tx::{since_relative_seconds, Transaction};
use tollgate_types::{now_secs, TxHash, ESTIMATED_FEE, MULTISIG_CODE_HASH};

use crate::{ChannelError, Result};

/// Result of channel creation: the persisted id plus the seller's
/// pre-signature over the refund, which the buyer needs before funding.
#[derive(Clone, Debug)]
pub struct CreatedChannel {
    pub channel_id: String,
    pub seller_signature: Vec<u8>,
}

/// Owns the channel state machine and the seller key.
pub struct ChannelManager {
    pub(crate) db: Arc<Mutex<Connection>>,
    pub(crate) ledger: Arc<dyn LedgerClient>,
    pub(crate) seller_key: Keypair,
    /// Base units per metered token; fixed at construction.
    pub(crate) exchange_rate: u64,
    pub(crate) ledger_timeout: Duration,
}

impl ChannelManager {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        ledger: Arc<dyn LedgerClient>,
        seller_key: Keypair,
        exchange_rate: u64,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            db,
            ledger,
            seller_key,
            exchange_rate,
            ledger_timeout,
        }
    }

    /// Create an INACTIVE channel from the buyer's funding and refund
    /// transactions, co-signing the refund.
    ///
    /// The buyer has not broadcast funding yet; the seller signature
    /// returned here is what makes the buyer's timelocked fallback valid.
    pub async fn create(
        &self,
        user_id: &str,
        amount: u64,
        duration_secs: u64,
        funding_tx: &[u8],
        refund_tx: &[u8],
    ) -> Result<CreatedChannel> {
        if duration_secs == 0 {
            return Err(ChannelError::Validation("duration must be positive".into()));
        }
        if amount <= ESTIMATED_FEE {
            return Err(ChannelError::Validation(format!(
                "amount {amount} does not cover the fee {ESTIMATED_FEE}"
            )));
        }

        let funding = Transaction::from_bytes(funding_tx)?;
        let refund = Transaction::from_bytes(refund_tx)?;
        let funding_hash = funding.hash()?;
        self.check_funding_shape(&funding, amount)?;
        check_refund_shape(&refund, &funding_hash, amount, duration_secs)?;

        // Bind the refund signature to its unlock delay.
        let refund_hash = refund.hash()?;
        let seller_signature = self
            .seller_key
            .sign_with_relative_timelock(&refund_hash, duration_secs)?;

        let now = now_secs();
        let channel = PaymentChannel {
            channel_id: new_id("chan"),
            user_id: user_id.to_string(),
            amount,
            duration_secs,
            status: ChannelStatus::Inactive,
            consumed_tokens: 0,
            is_default: false,
            seller_signature: Some(seller_signature.to_vec()),
            refund_tx: Some(refund_tx.to_vec()),
            funding_tx: Some(funding_tx.to_vec()),
            settle_tx: None,
            tx_hash: None,
            settle_hash: None,
            created_at: now,
            verified_at: None,
            updated_at: now,
        };

        let conn = self.db.lock().await;
        channels::insert(&conn, &channel)?;
        drop(conn);

        tracing::info!(
            channel_id = %channel.channel_id,
            user_id,
            amount,
            duration_secs,
            "channel created"
        );
        Ok(CreatedChannel {
            channel_id: channel.channel_id,
            seller_signature: seller_signature.to_vec(),
        })
    }

    /// Activate a channel after independently verifying its funding against
    /// the ledger.
    ///
    /// On success the user's other INACTIVE channels become INVALID (one
    /// pending/active lineage per user), and the channel becomes the
    /// default if the user has no ACTIVE default yet.
    pub async fn confirm_funding(
        &self,
        user_id: &str,
        channel_id: &str,
        observed_tx_hash: &TxHash,
    ) -> Result<PaymentChannel> {
        let channel = self.load_owned(user_id, channel_id).await?;
        if channel.status != ChannelStatus::Inactive {
            return Err(ChannelError::State(format!(
                "channel {channel_id} is {}, not INACTIVE",
                channel.status
            )));
        }

        let funding_bytes = channel
            .funding_tx
            .as_deref()
            .ok_or_else(|| ChannelError::IncompleteArtifact("missing funding transaction".into()))?;
        let funding = Transaction::from_bytes(funding_bytes)?;

        // Re-derive the hash from our stored bytes; the observed hash must
        // match before we trust anything the ledger returns.
        let local_hash = funding.hash()?;
        if &local_hash != observed_tx_hash {
            return Err(ChannelError::Validation(format!(
                "observed funding hash {} does not match stored transaction {}",
                hex::encode(observed_tx_hash),
                hex::encode(local_hash)
            )));
        }

        let on_ledger = with_timeout(
            self.ledger_timeout,
            self.ledger.get_transaction(observed_tx_hash),
        )
        .await?
        .ok_or_else(|| {
            ChannelError::Validation("funding transaction not found on ledger".into())
        })?;

        let observed_output = on_ledger
            .outputs
            .first()
            .ok_or_else(|| ChannelError::Validation("funding transaction has no outputs".into()))?;
        let expected_output = funding
            .outputs
            .first()
            .ok_or_else(|| ChannelError::IncompleteArtifact("funding has no outputs".into()))?;
        if observed_output.capacity != channel.amount || observed_output.lock != expected_output.lock
        {
            return Err(ChannelError::Validation(
                "on-ledger funding output does not match the channel lock/amount".into(),
            ));
        }

        let now = now_secs();
        let conn = self.db.lock().await;
        let make_default = !channels::has_active_default(&conn, user_id)?;
        let activated =
            channels::activate(&conn, channel_id, observed_tx_hash, make_default, now)?;
        if !activated {
            return Err(ChannelError::State(format!(
                "channel {channel_id} was concurrently moved out of INACTIVE"
            )));
        }
        let invalidated = channels::invalidate_other_inactive(&conn, user_id, channel_id, now)?;
        let updated = channels::get(&conn, channel_id)?;
        drop(conn);

        tracing::info!(
            channel_id,
            user_id,
            invalidated_siblings = invalidated,
            make_default,
            "channel activated"
        );
        Ok(updated)
    }

    /// Make this the user's sole default channel. ACTIVE channels only.
    pub async fn set_default(&self, user_id: &str, channel_id: &str) -> Result<()> {
        let channel = self.load_owned(user_id, channel_id).await?;
        if channel.status != ChannelStatus::Active {
            return Err(ChannelError::State(format!(
                "only ACTIVE channels can be default, channel is {}",
                channel.status
            )));
        }

        let conn = self.db.lock().await;
        // The guarded reassignment re-checks ACTIVE at write time; a channel
        // that left ACTIVE since the precheck loses without touching the
        // previous default.
        if !channels::set_default(&conn, user_id, channel_id, now_secs())? {
            return Err(ChannelError::State(format!(
                "channel {channel_id} is no longer ACTIVE"
            )));
        }
        Ok(())
    }

    /// Manually void an ACTIVE channel without settlement.
    pub async fn invalidate(&self, user_id: &str, channel_id: &str) -> Result<()> {
        self.load_owned(user_id, channel_id).await?;

        let conn = self.db.lock().await;
        if !channels::invalidate(&conn, channel_id, now_secs())? {
            return Err(ChannelError::State(format!(
                "channel {channel_id} is not ACTIVE"
            )));
        }
        tracing::info!(channel_id, user_id, "channel invalidated");
        Ok(())
    }

    /// Fetch a channel, enforcing ownership.
    pub async fn get_channel(&self, user_id: &str, channel_id: &str) -> Result<PaymentChannel> {
        self.load_owned(user_id, channel_id).await
    }

    /// All of a user's channels, newest first.
    pub async fn list_channels(&self, user_id: &str) -> Result<Vec<PaymentChannel>> {
        let conn = self.db.lock().await;
        Ok(channels::list_by_user(&conn, user_id)?)
    }

    /// Batch-expire elapsed ACTIVE channels. Sweeper entry point; makes no
    /// ledger calls.
    pub async fn expire_due(&self) -> Result<usize> {
        let conn = self.db.lock().await;
        let expired = channels::expire_due(&conn, now_secs())?;
        drop(conn);
        if expired > 0 {
            tracing::info!(expired, "expired elapsed channels");
        }
        Ok(expired)
    }

    /// ACTIVE channels expiring within the next `window_secs`.
    pub async fn expiring_within(&self, window_secs: u64) -> Result<Vec<PaymentChannel>> {
        let conn = self.db.lock().await;
        Ok(channels::expiring_within(&conn, now_secs(), window_secs)?)
    }

    /// Load a channel and verify the caller owns it.
    pub(crate) async fn load_owned(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<PaymentChannel> {
        let conn = self.db.lock().await;
        let channel = channels::get(&conn, channel_id)?;
        drop(conn);
        if channel.user_id != user_id {
            return Err(ChannelError::AccessDenied {
                user_id: user_id.to_string(),
                channel_id: channel_id.to_string(),
            });
        }
        Ok(channel)
    }

    /// The funding output's multisig lock must name this seller.
    fn check_funding_shape(&self, funding: &Transaction, amount: u64) -> Result<()> {
        let output = funding
            .outputs
            .first()
            .ok_or_else(|| ChannelError::Validation("funding has no outputs".into()))?;
        if output.capacity != amount {
            return Err(ChannelError::Validation(format!(
                "funding output capacity {} does not match channel amount {amount}",
                output.capacity
            )));
        }
        if output.lock.code_hash != MULTISIG_CODE_HASH {
            return Err(ChannelError::Validation(
                "funding output is not locked by the multisig contract".into(),
            ));
        }
        let args = &output.lock.args;
        if args.len() != 42 || args[0] != 2 || args[1] != 2 {
            return Err(ChannelError::Validation(
                "multisig args must be [2][2][buyer_hash][seller_hash]".into(),
            ));
        }
        if args[22..42] != self.seller_key.pubkey_hash() {
            return Err(ChannelError::Validation(
                "multisig seller hash does not match this seller".into(),
            ));
        }
        Ok(())
    }
}

/// Refund must spend funding output 0 under the channel's relative
/// timelock and return `amount - fee` to the buyer.
fn check_refund_shape(
    refund: &Transaction,
    funding_hash: &TxHash,
    amount: u64,
    duration_secs: u64,
) -> Result<()> {
    let input = refund
        .inputs
        .first()
        .ok_or_else(|| ChannelError::Validation("refund has no inputs".into()))?;
    if refund.inputs.len() != 1 {
        return Err(ChannelError::Validation(
            "refund must have exactly one input".into(),
        ));
    }
    if &input.previous_output.tx_hash != funding_hash || input.previous_output.index != 0 {
        return Err(ChannelError::Validation(
            "refund does not spend the funding output".into(),
        ));
    }
    if input.since != since_relative_seconds(duration_secs) {
        return Err(ChannelError::Validation(
            "refund since does not encode the channel duration".into(),
        ));
    }
    if refund.outputs_capacity() + ESTIMATED_FEE != amount {
        return Err(ChannelError::Validation(format!(
            "refund is unbalanced: outputs {} + fee {ESTIMATED_FEE} != amount {amount}",
            refund.outputs_capacity()
        )));
    }
    Ok(())
}

/// Opaque record id: prefix plus 16 random bytes, hex.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", hex::encode(rand::random::<[u8; 16]>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{buyer_artifacts, fixture, AMOUNT, DURATION};
    use tollgate_types::channel::ChannelStatus;

    #[tokio::test]
    async fn test_create_persists_inactive_channel() {
        let fx = fixture().await;
        let art = buyer_artifacts(&fx.buyer, &fx.manager.seller_key, AMOUNT, DURATION);

        let created = fx
            .manager
            .create("alice", AMOUNT, DURATION, &art.funding_bytes, &art.refund_bytes)
            .await
            .expect("create");

        let channel = fx
            .manager
            .get_channel("alice", &created.channel_id)
            .await
            .expect("get");
        assert_eq!(channel.status, ChannelStatus::Inactive);
        assert_eq!(channel.amount, AMOUNT);
        assert_eq!(channel.seller_signature, Some(created.seller_signature));
        assert!(channel.funding_tx.is_some());
        assert!(channel.refund_tx.is_some());
    }

    #[tokio::test]
    async fn test_create_signature_binds_timelock() {
        let fx = fixture().await;
        let art = buyer_artifacts(&fx.buyer, &fx.manager.seller_key, AMOUNT, DURATION);

        let created = fx
            .manager
            .create("alice", AMOUNT, DURATION, &art.funding_bytes, &art.refund_bytes)
            .await
            .expect("create");

        // The seller pre-signature verifies against the duration-bound digest.
        let refund_hash = art.refund.hash().expect("hash");
        let digest = tollgate_crypto::secp::timelock_digest(&refund_hash, DURATION);
        let sig: [u8; 65] = created
            .seller_signature
            .as_slice()
            .try_into()
            .expect("65 bytes");
        let recovered = tollgate_crypto::recover_pubkey(&digest, &sig).expect("recover");
        assert_eq!(recovered, fx.manager.seller_key.public_key());
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_amount() {
        let fx = fixture().await;
        let art = buyer_artifacts(&fx.buyer, &fx.manager.seller_key, AMOUNT, DURATION);

        let result = fx
            .manager
            .create("alice", AMOUNT + 1, DURATION, &art.funding_bytes, &art.refund_bytes)
            .await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_seller() {
        let fx = fixture().await;
        let other_seller = Keypair::generate();
        let art = buyer_artifacts(&fx.buyer, &other_seller, AMOUNT, DURATION);

        let result = fx
            .manager
            .create("alice", AMOUNT, DURATION, &art.funding_bytes, &art.refund_bytes)
            .await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_refund_since() {
        let fx = fixture().await;
        let mut art = buyer_artifacts(&fx.buyer, &fx.manager.seller_key, AMOUNT, DURATION);
        art.refund.inputs[0].since = since_relative_seconds(DURATION + 1);
        let refund_bytes = art.refund.to_bytes().expect("encode");

        let result = fx
            .manager
            .create("alice", AMOUNT, DURATION, &art.funding_bytes, &refund_bytes)
            .await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_confirm_funding_activates_and_invalidates_siblings() {
        let fx = fixture().await;

        // Two pending channels for alice, one for bob.
        let ch1 = fx.create_channel("alice").await;
        let ch2 = fx.create_channel("alice").await;
        let ch_bob = fx.create_channel("bob").await;

        let funding_hash = fx.seed_funding("alice", &ch1).await;
        let activated = fx
            .manager
            .confirm_funding("alice", &ch1, &funding_hash)
            .await
            .expect("confirm");

        assert_eq!(activated.status, ChannelStatus::Active);
        assert!(activated.is_default);
        assert_eq!(activated.tx_hash, Some(funding_hash));
        assert!(activated.verified_at.is_some());

        // Sibling INACTIVE channel invalidated; other users untouched.
        let sibling = fx.manager.get_channel("alice", &ch2).await.expect("get");
        assert_eq!(sibling.status, ChannelStatus::Invalid);
        let bob = fx.manager.get_channel("bob", &ch_bob).await.expect("get");
        assert_eq!(bob.status, ChannelStatus::Inactive);
    }

    #[tokio::test]
    async fn test_confirm_funding_second_channel_not_default() {
        let fx = fixture().await;

        let ch1 = fx.create_channel("alice").await;
        let hash1 = fx.seed_funding("alice", &ch1).await;
        fx.manager
            .confirm_funding("alice", &ch1, &hash1)
            .await
            .expect("confirm");

        let ch2 = fx.create_channel("alice").await;
        let hash2 = fx.seed_funding("alice", &ch2).await;
        let second = fx
            .manager
            .confirm_funding("alice", &ch2, &hash2)
            .await
            .expect("confirm");

        // ch1 already holds the ACTIVE default.
        assert!(!second.is_default);
    }

    #[tokio::test]
    async fn test_confirm_funding_wrong_hash() {
        let fx = fixture().await;
        let ch = fx.create_channel("alice").await;
        fx.seed_funding("alice", &ch).await;

        let result = fx.manager.confirm_funding("alice", &ch, &[0xEE; 32]).await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));

        let channel = fx.manager.get_channel("alice", &ch).await.expect("get");
        assert_eq!(channel.status, ChannelStatus::Inactive);
    }

    #[tokio::test]
    async fn test_confirm_funding_not_on_ledger() {
        let fx = fixture().await;
        let ch = fx.create_channel("alice").await;
        // Funding never broadcast: lookup misses.
        let channel = fx.manager.get_channel("alice", &ch).await.expect("get");
        let funding =
            Transaction::from_bytes(channel.funding_tx.as_deref().expect("tx")).expect("decode");
        let hash = funding.hash().expect("hash");

        let result = fx.manager.confirm_funding("alice", &ch, &hash).await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let fx = fixture().await;
        let ch = fx.create_channel("alice").await;

        let result = fx.manager.confirm_funding("mallory", &ch, &[0u8; 32]).await;
        assert!(matches!(result, Err(ChannelError::AccessDenied { .. })));

        let result = fx.manager.invalidate("mallory", &ch).await;
        assert!(matches!(result, Err(ChannelError::AccessDenied { .. })));
    }

    #[tokio::test]
    async fn test_set_default_requires_active() {
        let fx = fixture().await;
        let ch = fx.create_channel("alice").await;

        let result = fx.manager.set_default("alice", &ch).await;
        assert!(matches!(result, Err(ChannelError::State(_))));
    }

    #[tokio::test]
    async fn test_invalidate_active_channel() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;

        fx.manager.invalidate("alice", &ch).await.expect("invalidate");
        let channel = fx.manager.get_channel("alice", &ch).await.expect("get");
        assert_eq!(channel.status, ChannelStatus::Invalid);

        // Not ACTIVE any more: stale-state error.
        let result = fx.manager.invalidate("alice", &ch).await;
        assert!(matches!(result, Err(ChannelError::State(_))));
    }
}
