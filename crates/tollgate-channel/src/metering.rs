//! Chunk recording during streaming and buyer payment attachment.
//!
//! A [`StreamSession`] carries the token counter for one streaming turn in
//! memory: prior consumption is read once at session start, and every chunk
//! after that adds to the session-local count. Chunk rows therefore carry
//! strictly increasing cumulative totals even while earlier inserts of the
//! same session are still landing.

use tollgate_crypto::recover_pubkey;
use tollgate_db::queries::{channels, chunks};
use tollgate_types::channel::{ChannelStatus, PaymentChannel};
use tollgate_types::chunk::ChunkPayment;
use tollgate_types::tx::Transaction;
use tollgate_types::{now_secs, ESTIMATED_FEE};

use crate::manager::{new_id, ChannelManager};
use crate::{ChannelError, Result};

/// One streaming turn against an ACTIVE channel.
pub struct StreamSession<'a> {
    manager: &'a ChannelManager,
    user_id: String,
    channel_id: String,
    session_id: String,
    channel_amount: u64,
    /// Tokens already recorded for this channel before the session started.
    prior_tokens: u64,
    /// Tokens recorded by this session so far.
    session_tokens: u64,
}

impl ChannelManager {
    /// Open a streaming session on an ACTIVE channel.
    ///
    /// Prior consumption is snapshotted here, once; the session never
    /// re-reads it, so its cumulative totals cannot go backwards when a
    /// just-inserted chunk row is not yet visible to a fresh read.
    pub async fn start_session(
        &self,
        user_id: &str,
        channel_id: &str,
        session_id: &str,
    ) -> Result<StreamSession<'_>> {
        let channel = self.load_owned(user_id, channel_id).await?;
        if channel.status != ChannelStatus::Active {
            return Err(ChannelError::State(format!(
                "cannot stream against a {} channel",
                channel.status
            )));
        }

        let conn = self.db.lock().await;
        let prior_tokens = channels::confirmed_cumulative_tokens(&conn, channel_id)?;
        drop(conn);

        tracing::debug!(channel_id, session_id, prior_tokens, "session started");
        Ok(StreamSession {
            manager: self,
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            session_id: session_id.to_string(),
            channel_amount: channel.amount,
            prior_tokens,
            session_tokens: 0,
        })
    }

    /// Attach the buyer's signed payment transaction to a recorded chunk.
    ///
    /// Re-attaching to an already-paid chunk returns the stored row
    /// unchanged; the first payment's artifacts always stand.
    pub async fn attach_payment(
        &self,
        user_id: &str,
        channel_id: &str,
        chunk_id: &str,
        cumulative_payment: u64,
        remaining_balance: i64,
        transaction_data: &[u8],
        buyer_signature: &[u8],
    ) -> Result<ChunkPayment> {
        let channel = self.load_owned(user_id, channel_id).await?;
        if channel.status != ChannelStatus::Active {
            return Err(ChannelError::State(format!(
                "cannot attach payment to a {} channel",
                channel.status
            )));
        }

        let conn = self.db.lock().await;
        let chunk = chunks::get(&conn, chunk_id)?;
        drop(conn);
        if chunk.channel_id != channel_id {
            return Err(ChannelError::Validation(format!(
                "chunk {chunk_id} does not belong to channel {channel_id}"
            )));
        }
        if chunk.user_id != user_id {
            return Err(ChannelError::AccessDenied {
                user_id: user_id.to_string(),
                channel_id: channel_id.to_string(),
            });
        }
        if chunk.is_paid {
            return Ok(chunk);
        }

        if remaining_balance < 0 {
            return Err(ChannelError::InsufficientBalance {
                cumulative_payment,
                channel_amount: channel.amount,
            });
        }
        if cumulative_payment != chunk.cumulative_payment
            || remaining_balance != chunk.remaining_balance
        {
            return Err(ChannelError::Validation(format!(
                "payment amounts {cumulative_payment}/{remaining_balance} do not match \
                 the recorded chunk {}/{}",
                chunk.cumulative_payment, chunk.remaining_balance
            )));
        }

        let funding_hash = channel.tx_hash.ok_or_else(|| {
            ChannelError::IncompleteArtifact("channel has no confirmed funding hash".into())
        })?;
        self.check_payment_tx(
            &channel,
            &funding_hash,
            cumulative_payment,
            transaction_data,
            buyer_signature,
        )?;

        let conn = self.db.lock().await;
        let landed = chunks::mark_paid(&conn, chunk_id, transaction_data, buyer_signature)?;
        let stored = chunks::get(&conn, chunk_id)?;
        drop(conn);

        if landed {
            tracing::info!(channel_id, chunk_id, cumulative_payment, "payment attached");
        }
        Ok(stored)
    }

    /// The payment transaction must spend this channel's funding output,
    /// pay the seller exactly the cumulative amount, balance against the
    /// channel capacity, and carry a buyer signature that recovers to the
    /// buyer key named in the multisig lock.
    fn check_payment_tx(
        &self,
        channel: &PaymentChannel,
        funding_hash: &[u8; 32],
        cumulative_payment: u64,
        transaction_data: &[u8],
        buyer_signature: &[u8],
    ) -> Result<()> {
        let tx = Transaction::from_bytes(transaction_data)?;
        let input = tx
            .inputs
            .first()
            .ok_or_else(|| ChannelError::Validation("payment has no inputs".into()))?;
        if &input.previous_output.tx_hash != funding_hash || input.previous_output.index != 0 {
            return Err(ChannelError::Validation(
                "payment does not spend the channel funding output".into(),
            ));
        }
        let seller_output = tx
            .outputs
            .first()
            .ok_or_else(|| ChannelError::Validation("payment has no outputs".into()))?;
        if seller_output.capacity != cumulative_payment {
            return Err(ChannelError::Validation(format!(
                "payment output {} does not match cumulative payment {cumulative_payment}",
                seller_output.capacity
            )));
        }
        if tx.outputs_capacity() + ESTIMATED_FEE != channel.amount {
            return Err(ChannelError::Validation(format!(
                "payment is unbalanced: outputs {} + fee {ESTIMATED_FEE} != capacity {}",
                tx.outputs_capacity(),
                channel.amount
            )));
        }

        let sig: [u8; 65] = buyer_signature
            .try_into()
            .map_err(|_| ChannelError::Validation("buyer signature must be 65 bytes".into()))?;
        let tx_hash = tx.hash()?;
        let recovered = recover_pubkey(&tx_hash, &sig)
            .map_err(|e| ChannelError::Validation(format!("buyer signature invalid: {e}")))?;

        // Buyer hash lives at args[2..22] of the funding multisig lock.
        let funding = Transaction::from_bytes(channel.funding_tx.as_deref().ok_or_else(
            || ChannelError::IncompleteArtifact("missing funding transaction".into()),
        )?)?;
        let lock_args = &funding
            .outputs
            .first()
            .ok_or_else(|| ChannelError::IncompleteArtifact("funding has no outputs".into()))?
            .lock
            .args;
        if lock_args.len() != 42
            || lock_args[2..22] != tollgate_crypto::pubkey_hash(&recovered)
        {
            return Err(ChannelError::Validation(
                "buyer signature does not recover to the channel's buyer key".into(),
            ));
        }
        Ok(())
    }

    /// The canonical chunk a settlement would build on, if any.
    pub async fn latest_paid_chunk(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChunkPayment>> {
        self.load_owned(user_id, channel_id).await?;
        let conn = self.db.lock().await;
        Ok(chunks::latest_paid(&conn, channel_id)?)
    }
}

impl StreamSession<'_> {
    /// Record one metered chunk of `tokens` generated output.
    ///
    /// Always records, even when the chunk overruns the channel capacity:
    /// the stream is never interrupted over balance, and the negative
    /// remaining balance marks the chunk unpayable for audit.
    pub async fn record_chunk(&mut self, tokens: u64) -> Result<ChunkPayment> {
        let session_total = self
            .session_tokens
            .checked_add(tokens)
            .ok_or_else(|| ChannelError::Validation("token counter overflow".into()))?;
        let cumulative_tokens = self
            .prior_tokens
            .checked_add(session_total)
            .ok_or_else(|| ChannelError::Validation("token counter overflow".into()))?;
        let cumulative_payment = cumulative_tokens
            .checked_mul(self.manager.exchange_rate)
            .filter(|p| *p <= i64::MAX as u64)
            .ok_or_else(|| ChannelError::Validation("payment amount overflow".into()))?;
        let remaining_balance = self.channel_amount as i64 - cumulative_payment as i64;

        if remaining_balance < 0 {
            tracing::warn!(
                channel_id = %self.channel_id,
                session_id = %self.session_id,
                cumulative_payment,
                remaining_balance,
                "chunk overran channel capacity"
            );
        }

        let chunk = ChunkPayment {
            chunk_id: new_id("chunk"),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            channel_id: self.channel_id.clone(),
            tokens_count: tokens,
            is_paid: false,
            cumulative_payment,
            remaining_balance,
            transaction_data: None,
            buyer_signature: None,
            created_at: now_secs(),
        };

        let conn = self.manager.db.lock().await;
        chunks::insert(&conn, &chunk)?;
        channels::add_consumed_tokens(&conn, &self.channel_id, tokens, now_secs())?;
        drop(conn);

        self.session_tokens = session_total;
        Ok(chunk)
    }

    /// Tokens recorded by this session so far.
    pub fn session_tokens(&self) -> u64 {
        self.session_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, AMOUNT, RATE};

    #[tokio::test]
    async fn test_record_chunk_math() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let chunk = session.record_chunk(10).await.expect("record");

        assert_eq!(chunk.tokens_count, 10);
        assert_eq!(chunk.cumulative_payment, 10 * RATE);
        assert_eq!(chunk.remaining_balance, AMOUNT as i64 - (10 * RATE) as i64);
        assert!(!chunk.is_paid);

        let channel = fx.manager.get_channel("alice", &ch).await.expect("get");
        assert_eq!(channel.consumed_tokens, 10);
    }

    #[tokio::test]
    async fn test_cumulative_across_chunks_without_rereads() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let c1 = session.record_chunk(10).await.expect("record");
        let c2 = session.record_chunk(5).await.expect("record");
        let c3 = session.record_chunk(7).await.expect("record");

        assert_eq!(c1.cumulative_payment, 1_000);
        assert_eq!(c2.cumulative_payment, 1_500);
        assert_eq!(c3.cumulative_payment, 2_200);
        assert_eq!(session.session_tokens(), 22);
    }

    #[tokio::test]
    async fn test_second_session_snapshots_prior_tokens() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;

        let mut s1 = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        s1.record_chunk(10).await.expect("record");
        drop(s1);

        let mut s2 = fx
            .manager
            .start_session("alice", &ch, "sess2")
            .await
            .expect("session");
        let chunk = s2.record_chunk(10).await.expect("record");
        // 20 tokens total across both sessions.
        assert_eq!(chunk.cumulative_payment, 20 * RATE);
    }

    #[tokio::test]
    async fn test_overrun_is_recorded_not_fatal() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        // 2000 tokens at rate 100 = 200_000 > 100_000 capacity.
        let over = session.record_chunk(2_000).await.expect("record");
        assert!(over.remaining_balance < 0);
        assert!(!over.payable());

        // Stream continues past the overrun.
        let next = session.record_chunk(1).await.expect("record");
        assert_eq!(next.cumulative_payment, 2_001 * RATE);
    }

    #[tokio::test]
    async fn test_session_requires_active_channel() {
        let fx = fixture().await;
        let ch = fx.create_channel("alice").await;
        let result = fx.manager.start_session("alice", &ch, "sess1").await;
        assert!(matches!(result, Err(ChannelError::State(_))));
    }

    #[tokio::test]
    async fn test_attach_payment_happy_path() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;
        let funding_hash = fx.funding_hash("alice", &ch).await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let chunk = session.record_chunk(10).await.expect("record");

        let (tx_bytes, sig) = fx.payment_artifacts(&funding_hash, chunk.cumulative_payment);
        let paid = fx
            .manager
            .attach_payment(
                "alice",
                &ch,
                &chunk.chunk_id,
                chunk.cumulative_payment,
                chunk.remaining_balance,
                &tx_bytes,
                &sig,
            )
            .await
            .expect("attach");

        assert!(paid.is_paid);
        assert_eq!(paid.transaction_data, Some(tx_bytes));
        assert_eq!(paid.buyer_signature, Some(sig.to_vec()));
    }

    #[tokio::test]
    async fn test_attach_payment_idempotent() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;
        let funding_hash = fx.funding_hash("alice", &ch).await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let chunk = session.record_chunk(10).await.expect("record");

        let (tx_bytes, sig) = fx.payment_artifacts(&funding_hash, chunk.cumulative_payment);
        fx.manager
            .attach_payment(
                "alice",
                &ch,
                &chunk.chunk_id,
                chunk.cumulative_payment,
                chunk.remaining_balance,
                &tx_bytes,
                &sig,
            )
            .await
            .expect("attach");

        // Second delivery with different bytes: first artifacts stand.
        let (other_tx, other_sig) = fx.payment_artifacts(&funding_hash, chunk.cumulative_payment);
        let stored = fx
            .manager
            .attach_payment(
                "alice",
                &ch,
                &chunk.chunk_id,
                chunk.cumulative_payment,
                chunk.remaining_balance,
                &other_tx,
                &other_sig,
            )
            .await
            .expect("attach again");
        assert!(stored.is_paid);
        assert_eq!(stored.transaction_data, Some(tx_bytes));
    }

    #[tokio::test]
    async fn test_attach_payment_rejects_overrun_chunk() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;
        let funding_hash = fx.funding_hash("alice", &ch).await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let over = session.record_chunk(2_000).await.expect("record");
        assert!(over.remaining_balance < 0);

        let (tx_bytes, sig) = fx.payment_artifacts(&funding_hash, 1_000);
        let result = fx
            .manager
            .attach_payment(
                "alice",
                &ch,
                &over.chunk_id,
                over.cumulative_payment,
                over.remaining_balance,
                &tx_bytes,
                &sig,
            )
            .await;
        assert!(matches!(
            result,
            Err(ChannelError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_attach_payment_rejects_amount_mismatch() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;
        let funding_hash = fx.funding_hash("alice", &ch).await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let chunk = session.record_chunk(10).await.expect("record");

        // Buyer claims a lower cumulative total than the chunk records.
        let (tx_bytes, sig) = fx.payment_artifacts(&funding_hash, 500);
        let result = fx
            .manager
            .attach_payment(
                "alice",
                &ch,
                &chunk.chunk_id,
                500,
                AMOUNT as i64 - 500,
                &tx_bytes,
                &sig,
            )
            .await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_attach_payment_rejects_foreign_signature() {
        let fx = fixture().await;
        let ch = fx.activate_channel("alice").await;
        let funding_hash = fx.funding_hash("alice", &ch).await;

        let mut session = fx
            .manager
            .start_session("alice", &ch, "sess1")
            .await
            .expect("session");
        let chunk = session.record_chunk(10).await.expect("record");

        // Signed by someone other than the channel's buyer.
        let intruder = tollgate_crypto::Keypair::generate();
        let (tx_bytes, _) = fx.payment_artifacts(&funding_hash, chunk.cumulative_payment);
        let tx = Transaction::from_bytes(&tx_bytes).expect("decode");
        let sig = intruder
            .sign_recoverable(&tx.hash().expect("hash"))
            .expect("sign");

        let result = fx
            .manager
            .attach_payment(
                "alice",
                &ch,
                &chunk.chunk_id,
                chunk.cumulative_payment,
                chunk.remaining_balance,
                &tx_bytes,
                &sig,
            )
            .await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }

    #[tokio::test]
    async fn test_attach_payment_rejects_wrong_channel() {
        let fx = fixture().await;
        let ch1 = fx.activate_channel("alice").await;
        let funding_hash = fx.funding_hash("alice", &ch1).await;

        let mut session = fx
            .manager
            .start_session("alice", &ch1, "sess1")
            .await
            .expect("session");
        let chunk = session.record_chunk(10).await.expect("record");

        let ch2 = fx.activate_channel("alice").await;
        let (tx_bytes, sig) = fx.payment_artifacts(&funding_hash, chunk.cumulative_payment);
        let result = fx
            .manager
            .attach_payment(
                "alice",
                &ch2,
                &chunk.chunk_id,
                chunk.cumulative_payment,
                chunk.remaining_balance,
                &tx_bytes,
                &sig,
            )
            .await;
        assert!(matches!(result, Err(ChannelError::Validation(_))));
    }
}
