//! Shared harness: a channel manager over an in-memory database and mock
//! ledger, plus a buyer building transactions the way a real client would.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use tollgate_channel::ChannelManager;
use tollgate_crypto::Keypair;
use tollgate_db::queries::channels;
use tollgate_ledger::mock::MockLedger;
use tollgate_tx::builder::{
    build_funding_transaction, build_payment_transaction, build_refund_transaction, multisig_lock,
};
use tollgate_types::tx::{CellOutput, LiveCell, OutPoint, Script, Transaction};
use tollgate_types::{now_secs, Signature65, TxHash, ESTIMATED_FEE, SECP_CODE_HASH};

pub const AMOUNT: u64 = 100_000;
pub const DURATION: u64 = 86_400;
pub const RATE: u64 = 100;

pub struct Harness {
    pub manager: ChannelManager,
    pub db: Arc<Mutex<Connection>>,
    pub ledger: Arc<MockLedger>,
    pub buyer: Keypair,
    pub seller: Keypair,
}

pub fn harness() -> Harness {
    let db = Arc::new(Mutex::new(
        tollgate_db::open_memory().expect("open test db"),
    ));
    let ledger = Arc::new(MockLedger::new());
    let seller = Keypair::generate();
    let manager = ChannelManager::new(
        db.clone(),
        ledger.clone(),
        seller.clone(),
        RATE,
        Duration::from_secs(5),
    );
    Harness {
        manager,
        db,
        ledger,
        buyer: Keypair::generate(),
        seller,
    }
}

fn secp_lock(key: &Keypair) -> Script {
    Script {
        code_hash: SECP_CODE_HASH,
        args: key.pubkey_hash().to_vec(),
    }
}

impl Harness {
    /// Buyer-side funding and refund bytes for one channel request.
    pub fn buyer_artifacts(&self) -> (Vec<u8>, Vec<u8>) {
        let buyer_lock = secp_lock(&self.buyer);
        let (channel_lock, _) = multisig_lock(&self.buyer.pubkey_hash(), &self.seller.pubkey_hash());

        let spendable = vec![LiveCell {
            out_point: OutPoint {
                tx_hash: rand::random(),
                index: 0,
            },
            output: CellOutput {
                capacity: AMOUNT + ESTIMATED_FEE,
                lock: buyer_lock.clone(),
            },
        }];
        let funding = build_funding_transaction(&channel_lock, AMOUNT, &spendable, &buyer_lock)
            .expect("build funding");
        let refund = build_refund_transaction(
            &funding.hash().expect("funding hash"),
            &buyer_lock,
            AMOUNT,
            DURATION,
        )
        .expect("build refund");
        (
            funding.to_bytes().expect("encode funding"),
            refund.to_bytes().expect("encode refund"),
        )
    }

    /// Create an INACTIVE channel for `user`.
    pub async fn create_channel(&self, user: &str) -> String {
        let (funding, refund) = self.buyer_artifacts();
        self.manager
            .create(user, AMOUNT, DURATION, &funding, &refund)
            .await
            .expect("create channel")
            .channel_id
    }

    /// Broadcast the stored funding transaction on the mock ledger.
    pub async fn broadcast_funding(&self, user: &str, channel_id: &str) -> TxHash {
        let channel = self
            .manager
            .get_channel(user, channel_id)
            .await
            .expect("get channel");
        let funding = Transaction::from_bytes(channel.funding_tx.as_deref().expect("funding tx"))
            .expect("decode funding");
        self.ledger
            .seed_transaction(funding)
            .await
            .expect("seed funding")
    }

    /// Create, broadcast, and confirm; returns the ACTIVE channel id.
    pub async fn activate_channel(&self, user: &str) -> String {
        let channel_id = self.create_channel(user).await;
        let hash = self.broadcast_funding(user, &channel_id).await;
        self.manager
            .confirm_funding(user, &channel_id, &hash)
            .await
            .expect("confirm funding");
        channel_id
    }

    /// Buyer signs a payment for `cumulative` base units owed.
    pub async fn pay_chunk(
        &self,
        user: &str,
        channel_id: &str,
        chunk: &tollgate_types::chunk::ChunkPayment,
    ) {
        let funding_hash = self
            .manager
            .get_channel(user, channel_id)
            .await
            .expect("get channel")
            .tx_hash
            .expect("funding hash");
        let (tx_bytes, sig) = self.payment_artifacts(&funding_hash, chunk.cumulative_payment);
        self.manager
            .attach_payment(
                user,
                channel_id,
                &chunk.chunk_id,
                chunk.cumulative_payment,
                chunk.remaining_balance,
                &tx_bytes,
                &sig,
            )
            .await
            .expect("attach payment");
    }

    pub fn payment_artifacts(
        &self,
        funding_hash: &TxHash,
        cumulative: u64,
    ) -> (Vec<u8>, Signature65) {
        let tx = build_payment_transaction(
            funding_hash,
            &secp_lock(&self.seller),
            &secp_lock(&self.buyer),
            cumulative,
            AMOUNT - cumulative - ESTIMATED_FEE,
            AMOUNT,
        )
        .expect("build payment");
        let sig = self
            .buyer
            .sign_recoverable(&tx.hash().expect("payment hash"))
            .expect("buyer sign");
        (tx.to_bytes().expect("encode payment"), sig)
    }

    /// Rewind `created_at` so the channel expires `secs_left` from now.
    /// Stands in for the passage of time.
    pub async fn set_expiry_in(&self, channel_id: &str, secs_left: i64) {
        let created_at = (now_secs() as i64 - DURATION as i64 + secs_left) as u64;
        let conn = self.db.lock().await;
        channels::set_created_at(&conn, channel_id, created_at).expect("rewind created_at");
    }
}
