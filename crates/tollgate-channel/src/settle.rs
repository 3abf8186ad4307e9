//! Cooperative settlement from the latest paid chunk.
//!
//! The seller counter-signs the buyer's highest-paying transaction, fills
//! the 2-of-2 witness, and submits. The channel record only moves to
//! SETTLED after the ledger accepts the submission. Before submitting, the
//! chosen transaction is pinned on the channel row: a timed-out submission
//! may have landed, so retries resubmit the pinned bytes verbatim instead
//! of re-deriving a different split of the same funding output. A
//! definitive rejection drops the pin and leaves the channel ACTIVE.

use tollgate_db::queries::{channels, chunks};
use tollgate_ledger::LedgerError;
use tollgate_tx::witness::Witness2of2;
use tollgate_types::channel::ChannelStatus;
use tollgate_types::chunk::ChunkPayment;
use tollgate_types::tx::Transaction;
use tollgate_types::{now_secs, TxHash};

use crate::manager::ChannelManager;
use crate::{ChannelError, Result};

/// Outcome of a successful settlement.
#[derive(Clone, Debug)]
pub struct SettlementOutcome {
    pub channel_id: String,
    pub tx_hash: TxHash,
    /// Base units paid to the seller by the settled transaction.
    pub cumulative_payment: u64,
}

impl ChannelManager {
    /// Settle a channel at the caller's request, enforcing ownership.
    pub async fn settle_for(&self, user_id: &str, channel_id: &str) -> Result<SettlementOutcome> {
        self.load_owned(user_id, channel_id).await?;
        self.settle(channel_id).await
    }

    /// Settle an ACTIVE channel from its latest paid chunk.
    ///
    /// Sweeper entry point; no ownership check. Idempotent against a
    /// concurrent settler: if another writer moved the channel to SETTLED
    /// between submission and the guarded update, the stored settlement
    /// stands and is returned.
    pub async fn settle(&self, channel_id: &str) -> Result<SettlementOutcome> {
        let conn = self.db.lock().await;
        let channel = channels::get(&conn, channel_id)?;
        let canonical = chunks::latest_paid(&conn, channel_id)?;
        drop(conn);

        if channel.status != ChannelStatus::Active {
            return Err(ChannelError::State(format!(
                "cannot settle a {} channel",
                channel.status
            )));
        }

        // An ACTIVE channel with a pinned settlement means an earlier
        // submission timed out and may have landed: resubmit those exact
        // bytes, never a rebuilt transaction from a newer chunk.
        let (tx, settle_bytes) = match (channel.settle_tx, channel.settle_hash) {
            (Some(bytes), Some(_)) => {
                tracing::warn!(channel_id, "resubmitting pinned settlement transaction");
                (Transaction::from_bytes(&bytes)?, bytes)
            }
            _ => {
                let chunk = canonical.ok_or(ChannelError::NoPayment)?;
                let tx = self.counter_signed_payment(&chunk)?;
                let bytes = tx.to_bytes()?;
                let conn = self.db.lock().await;
                let pinned =
                    channels::pin_settlement(&conn, channel_id, &tx.hash()?, &bytes, now_secs())?;
                drop(conn);
                if !pinned {
                    return Err(ChannelError::State(format!(
                        "channel {channel_id} left ACTIVE state during settlement"
                    )));
                }
                (tx, bytes)
            }
        };

        let cumulative_payment = tx.outputs.first().map(|o| o.capacity).ok_or_else(|| {
            ChannelError::IncompleteArtifact("settlement transaction has no outputs".into())
        })?;

        let submitted_hash = match tollgate_ledger::with_timeout(
            self.ledger_timeout,
            self.ledger.submit_transaction(&tx),
        )
        .await
        {
            Ok(hash) => hash,
            Err(err @ LedgerError::Timeout(_)) => {
                // Outcome unknown; the pin stays so the retry resubmits the
                // same transaction.
                tracing::warn!(channel_id, "settlement submission timed out, staying pinned");
                return Err(err.into());
            }
            Err(err) => {
                // Definitive rejection: the transaction never landed, so a
                // later attempt may settle from a newer chunk.
                let conn = self.db.lock().await;
                channels::clear_pinned_settlement(&conn, channel_id, now_secs())?;
                return Err(err.into());
            }
        };

        let conn = self.db.lock().await;
        let marked = channels::mark_settled(
            &conn,
            channel_id,
            &submitted_hash,
            &settle_bytes,
            now_secs(),
        )?;
        let current = channels::get(&conn, channel_id)?;
        drop(conn);

        if !marked {
            // Another settler won the guarded update after our submission.
            match (current.status, current.settle_hash) {
                (ChannelStatus::Settled, Some(hash)) => {
                    tracing::warn!(channel_id, "channel was settled concurrently");
                    let paid = current
                        .settle_tx
                        .as_deref()
                        .map(Transaction::from_bytes)
                        .transpose()?
                        .and_then(|t| t.outputs.first().map(|o| o.capacity))
                        .unwrap_or(cumulative_payment);
                    return Ok(SettlementOutcome {
                        channel_id: channel_id.to_string(),
                        tx_hash: hash,
                        cumulative_payment: paid,
                    });
                }
                _ => {
                    return Err(ChannelError::State(format!(
                        "channel {channel_id} left ACTIVE state during settlement"
                    )));
                }
            }
        }

        tracing::info!(
            channel_id,
            tx_hash = %hex::encode(submitted_hash),
            cumulative_payment,
            "channel settled"
        );
        Ok(SettlementOutcome {
            channel_id: channel_id.to_string(),
            tx_hash: submitted_hash,
            cumulative_payment,
        })
    }

    /// Counter-sign the buyer's payment transaction from a paid chunk and
    /// fill its 2-of-2 witness.
    fn counter_signed_payment(&self, chunk: &ChunkPayment) -> Result<Transaction> {
        let tx_data = chunk.transaction_data.as_deref().ok_or_else(|| {
            ChannelError::IncompleteArtifact(format!(
                "paid chunk {} has no transaction data",
                chunk.chunk_id
            ))
        })?;
        let buyer_sig: [u8; 65] = chunk
            .buyer_signature
            .as_deref()
            .ok_or_else(|| {
                ChannelError::IncompleteArtifact(format!(
                    "paid chunk {} has no buyer signature",
                    chunk.chunk_id
                ))
            })?
            .try_into()
            .map_err(|_| {
                ChannelError::IncompleteArtifact("stored buyer signature is not 65 bytes".into())
            })?;

        let mut tx = Transaction::from_bytes(tx_data)?;
        if tx.witnesses.is_empty() {
            return Err(ChannelError::IncompleteArtifact(
                "payment transaction has no witness slot".into(),
            ));
        }
        let payment_hash = tx.hash()?;
        let seller_sig = self.seller_key.sign_recoverable(&payment_hash)?;
        let witness = Witness2of2::new(&buyer_sig, &seller_sig)?.to_bytes();
        if Witness2of2::is_placeholder(&witness) {
            return Err(ChannelError::IncompleteArtifact(
                "assembled witness is still the unsigned placeholder".into(),
            ));
        }
        tx.witnesses[0] = witness;
        Ok(tx)
    }
}
