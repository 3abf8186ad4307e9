//! In-memory ledger double for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tollgate_types::tx::{LiveCell, Script, Transaction};
use tollgate_types::TxHash;

use crate::{LedgerClient, LedgerError, Result};

#[derive(Default)]
struct MockState {
    transactions: HashMap<TxHash, Transaction>,
    spendable: Vec<LiveCell>,
    submitted: Vec<TxHash>,
    fail_next_submit: Option<String>,
}

/// An in-memory [`LedgerClient`] that records submissions and serves
/// lookups from a seeded transaction set.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a transaction as if it were already confirmed on the ledger.
    pub async fn seed_transaction(&self, tx: Transaction) -> Result<TxHash> {
        let hash = tx.hash()?;
        self.state.lock().await.transactions.insert(hash, tx);
        Ok(hash)
    }

    /// Seed a spendable cell.
    pub async fn seed_spendable_cell(&self, cell: LiveCell) {
        self.state.lock().await.spendable.push(cell);
    }

    /// Make the next `submit_transaction` fail with a rejection.
    pub async fn fail_next_submit(&self, reason: &str) {
        self.state.lock().await.fail_next_submit = Some(reason.to_string());
    }

    /// Hashes of all submitted transactions, in order.
    pub async fn submitted(&self) -> Vec<TxHash> {
        self.state.lock().await.submitted.clone()
    }

    /// Number of submissions seen.
    pub async fn submitted_count(&self) -> usize {
        self.state.lock().await.submitted.len()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<TxHash> {
        let mut state = self.state.lock().await;
        if let Some(reason) = state.fail_next_submit.take() {
            return Err(LedgerError::Rejected(reason));
        }
        let hash = tx.hash()?;
        state.transactions.insert(hash, tx.clone());
        state.submitted.push(hash);
        Ok(hash)
    }

    async fn get_transaction(&self, hash: &TxHash) -> Result<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.get(hash).cloned())
    }

    async fn find_spendable_cells(
        &self,
        lock: &Script,
        min_capacity: u64,
    ) -> Result<Vec<LiveCell>> {
        let state = self.state.lock().await;
        let mut gathered = 0u64;
        let mut cells = Vec::new();
        for cell in state.spendable.iter().filter(|c| &c.output.lock == lock) {
            cells.push(cell.clone());
            gathered = gathered.saturating_add(cell.output.capacity);
            if gathered >= min_capacity {
                break;
            }
        }
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_types::tx::{CellInput, CellOutput, OutPoint};
    use tollgate_types::SECP_CODE_HASH;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 0,
            cell_deps: vec![],
            inputs: vec![CellInput {
                previous_output: OutPoint {
                    tx_hash: [1u8; 32],
                    index: 0,
                },
                since: 0,
            }],
            outputs: vec![CellOutput {
                capacity: 500,
                lock: Script {
                    code_hash: SECP_CODE_HASH,
                    args: vec![1, 2, 3],
                },
            }],
            witnesses: vec![Vec::new()],
        }
    }

    #[tokio::test]
    async fn test_submit_then_lookup() {
        let ledger = MockLedger::new();
        let tx = sample_tx();
        let hash = ledger.submit_transaction(&tx).await.expect("submit");

        let found = ledger.get_transaction(&hash).await.expect("get");
        assert_eq!(found, Some(tx));
        assert_eq!(ledger.submitted_count().await, 1);
    }

    #[tokio::test]
    async fn test_fail_next_submit_is_one_shot() {
        let ledger = MockLedger::new();
        ledger.fail_next_submit("mempool full").await;

        let tx = sample_tx();
        assert!(matches!(
            ledger.submit_transaction(&tx).await,
            Err(LedgerError::Rejected(_))
        ));
        // Next attempt succeeds.
        ledger.submit_transaction(&tx).await.expect("submit");
    }

    #[tokio::test]
    async fn test_find_spendable_filters_by_lock() {
        let ledger = MockLedger::new();
        let lock = Script {
            code_hash: SECP_CODE_HASH,
            args: vec![0xAA],
        };
        let other = Script {
            code_hash: SECP_CODE_HASH,
            args: vec![0xBB],
        };
        ledger
            .seed_spendable_cell(LiveCell {
                out_point: OutPoint {
                    tx_hash: [1u8; 32],
                    index: 0,
                },
                output: CellOutput {
                    capacity: 1_000,
                    lock: lock.clone(),
                },
            })
            .await;
        ledger
            .seed_spendable_cell(LiveCell {
                out_point: OutPoint {
                    tx_hash: [2u8; 32],
                    index: 0,
                },
                output: CellOutput {
                    capacity: 1_000,
                    lock: other,
                },
            })
            .await;

        let cells = ledger.find_spendable_cells(&lock, 500).await.expect("find");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].out_point.tx_hash, [1u8; 32]);
    }
}
