//! Shared fixtures for channel tests: an in-memory database, a mock
//! ledger, and a buyer who builds funding/refund/payment transactions the
//! way a real client would.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use tollgate_crypto::Keypair;
use tollgate_ledger::mock::MockLedger;
use tollgate_tx::builder::{
    build_funding_transaction, build_payment_transaction, build_refund_transaction, multisig_lock,
};
use tollgate_types::tx::{CellOutput, LiveCell, OutPoint, Script, Transaction};
use tollgate_types::{Signature65, TxHash, ESTIMATED_FEE, SECP_CODE_HASH};

use crate::manager::ChannelManager;

pub(crate) const AMOUNT: u64 = 100_000;
pub(crate) const DURATION: u64 = 86_400;
pub(crate) const RATE: u64 = 100;

pub(crate) struct Fixture {
    pub manager: ChannelManager,
    pub ledger: Arc<MockLedger>,
    pub buyer: Keypair,
}

pub(crate) async fn fixture() -> Fixture {
    let conn = tollgate_db::open_memory().expect("open test db");
    let ledger = Arc::new(MockLedger::new());
    let manager = ChannelManager::new(
        Arc::new(Mutex::new(conn)),
        ledger.clone(),
        Keypair::generate(),
        RATE,
        Duration::from_secs(5),
    );
    Fixture {
        manager,
        ledger,
        buyer: Keypair::generate(),
    }
}

impl Fixture {
    /// Create an INACTIVE channel for `user` with the standard fixture
    /// amount and duration.
    pub async fn create_channel(&self, user: &str) -> String {
        let art = buyer_artifacts(&self.buyer, &self.manager.seller_key, AMOUNT, DURATION);
        self.manager
            .create(user, AMOUNT, DURATION, &art.funding_bytes, &art.refund_bytes)
            .await
            .expect("create channel")
            .channel_id
    }

    /// Seed the channel's funding transaction on the mock ledger, as if the
    /// buyer broadcast it, and return its hash.
    pub async fn seed_funding(&self, user: &str, channel_id: &str) -> TxHash {
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

    /// Full create + broadcast + confirm path; returns the ACTIVE channel id.
    pub async fn activate_channel(&self, user: &str) -> String {
        let channel_id = self.create_channel(user).await;
        let hash = self.seed_funding(user, &channel_id).await;
        self.manager
            .confirm_funding(user, &channel_id, &hash)
            .await
            .expect("confirm funding");
        channel_id
    }

    /// The confirmed funding hash of an ACTIVE channel.
    pub async fn funding_hash(&self, user: &str, channel_id: &str) -> TxHash {
        self.manager
            .get_channel(user, channel_id)
            .await
            .expect("get channel")
            .tx_hash
            .expect("funding hash")
    }

    /// Buyer-side payment artifacts for `cumulative` base units owed.
    pub fn payment_artifacts(
        &self,
        funding_hash: &TxHash,
        cumulative: u64,
    ) -> (Vec<u8>, Signature65) {
        payment_artifacts(
            &self.buyer,
            &self.manager.seller_key,
            funding_hash,
            cumulative,
            AMOUNT,
        )
    }
}

pub(crate) struct BuyerArtifacts {
    pub funding_bytes: Vec<u8>,
    pub refund: Transaction,
    pub refund_bytes: Vec<u8>,
}

fn secp_lock(key: &Keypair) -> Script {
    Script {
        code_hash: SECP_CODE_HASH,
        args: key.pubkey_hash().to_vec(),
    }
}

/// What the buyer's client does before asking the seller to open a channel:
/// build the funding transaction from its own cells and the timelocked
/// refund spending it.
pub(crate) fn buyer_artifacts(
    buyer: &Keypair,
    seller: &Keypair,
    amount: u64,
    duration_secs: u64,
) -> BuyerArtifacts {
    let buyer_lock = secp_lock(buyer);
    let (channel_lock, _) = multisig_lock(&buyer.pubkey_hash(), &seller.pubkey_hash());

    let spendable = vec![LiveCell {
        out_point: OutPoint {
            tx_hash: [0xF0; 32],
            index: 0,
        },
        output: CellOutput {
            capacity: amount + ESTIMATED_FEE,
            lock: buyer_lock.clone(),
        },
    }];
    let funding = build_funding_transaction(&channel_lock, amount, &spendable, &buyer_lock)
        .expect("build funding");
    let funding_bytes = funding.to_bytes().expect("encode funding");
    let funding_hash = funding.hash().expect("funding hash");

    let refund = build_refund_transaction(&funding_hash, &buyer_lock, amount, duration_secs)
        .expect("build refund");
    let refund_bytes = refund.to_bytes().expect("encode refund");

    BuyerArtifacts {
        funding_bytes,
        refund,
        refund_bytes,
    }
}

/// Buyer-signed payment transaction splitting `amount` as `cumulative` to
/// the seller, the rest (minus fee) back to the buyer.
pub(crate) fn payment_artifacts(
    buyer: &Keypair,
    seller: &Keypair,
    funding_hash: &TxHash,
    cumulative: u64,
    amount: u64,
) -> (Vec<u8>, Signature65) {
    let tx = build_payment_transaction(
        funding_hash,
        &secp_lock(seller),
        &secp_lock(buyer),
        cumulative,
        amount - cumulative - ESTIMATED_FEE,
        amount,
    )
    .expect("build payment");
    let hash = tx.hash().expect("payment hash");
    let sig = buyer.sign_recoverable(&hash).expect("buyer sign");
    (tx.to_bytes().expect("encode payment"), sig)
}
