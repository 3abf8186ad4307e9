//! Lock script and channel transaction construction.
//!
//! All three transactions spend or create the channel's single multisig
//! output. Capacity accounting is exact: inputs == outputs + `ESTIMATED_FEE`
//! always, checked at build time.

use tollgate_types::tx::{
    since_relative_seconds, CellInput, CellOutput, LiveCell, OutPoint, Script, Transaction,
};
use tollgate_types::{PubkeyHash, TxHash, ESTIMATED_FEE, MULTISIG_CODE_HASH};

use crate::witness::Witness2of2;
use crate::{Result, TxError};

/// Out-point of the deployed multisig contract cell.
pub const MULTISIG_DEP: OutPoint = OutPoint {
    tx_hash: [
        0x71, 0xa7, 0xba, 0x8f, 0xc9, 0x63, 0x49, 0xfe, 0xa0, 0xed, 0x3a, 0x5c,
        0x47, 0x99, 0x2e, 0x3b, 0x40, 0x84, 0xb0, 0x31, 0xa4, 0x22, 0x64, 0xa0,
        0x18, 0xe0, 0x07, 0x2e, 0x81, 0x72, 0xe4, 0x6c,
    ],
    index: 1,
};

/// Out-point of the deployed single-signature contract cell.
pub const SECP_DEP: OutPoint = OutPoint {
    tx_hash: [
        0x71, 0xa7, 0xba, 0x8f, 0xc9, 0x63, 0x49, 0xfe, 0xa0, 0xed, 0x3a, 0x5c,
        0x47, 0x99, 0x2e, 0x3b, 0x40, 0x84, 0xb0, 0x31, 0xa4, 0x22, 0x64, 0xa0,
        0x18, 0xe0, 0x07, 0x2e, 0x81, 0x72, 0xe4, 0x6c,
    ],
    index: 0,
};

/// Build the channel's 2-of-2 threshold lock.
///
/// Args layout: `[threshold=2][total=2][buyer_hash(20)][seller_hash(20)]`.
pub fn multisig_lock(
    buyer_hash: &PubkeyHash,
    seller_hash: &PubkeyHash,
) -> (Script, Vec<OutPoint>) {
    let mut args = Vec::with_capacity(2 + buyer_hash.len() + seller_hash.len());
    args.push(2u8);
    args.push(2u8);
    args.extend_from_slice(buyer_hash);
    args.extend_from_slice(seller_hash);

    let script = Script {
        code_hash: MULTISIG_CODE_HASH,
        args,
    };
    (script, vec![MULTISIG_DEP])
}

/// Build the funding transaction: a single output of `amount` under the
/// multisig lock, funded from the buyer's spendable cells with change back
/// to `change_lock`.
pub fn build_funding_transaction(
    lock: &Script,
    amount: u64,
    spendable: &[LiveCell],
    change_lock: &Script,
) -> Result<Transaction> {
    let required = amount
        .checked_add(ESTIMATED_FEE)
        .ok_or(TxError::BelowFee { amount, fee: ESTIMATED_FEE })?;

    let mut inputs = Vec::new();
    let mut gathered = 0u64;
    for cell in spendable {
        inputs.push(CellInput {
            previous_output: cell.out_point,
            since: 0,
        });
        gathered = gathered.saturating_add(cell.output.capacity);
        if gathered >= required {
            break;
        }
    }
    if gathered < required {
        return Err(TxError::InsufficientCapacity {
            available: gathered,
            required,
        });
    }

    let mut outputs = vec![CellOutput {
        capacity: amount,
        lock: lock.clone(),
    }];
    let change = gathered - required;
    if change > 0 {
        outputs.push(CellOutput {
            capacity: change,
            lock: change_lock.clone(),
        });
    }

    let witnesses = vec![Vec::new(); inputs.len()];
    let tx = Transaction {
        version: 0,
        cell_deps: vec![SECP_DEP],
        inputs,
        outputs,
        witnesses,
    };
    debug_assert_eq!(gathered, tx.outputs_capacity() + ESTIMATED_FEE);
    tracing::debug!(amount, change, inputs = tx.inputs.len(), "funding transaction built");
    Ok(tx)
}

/// Build the refund transaction: spends the funding output after a relative
/// timelock of `duration_secs`, returning `amount - ESTIMATED_FEE` to the
/// buyer. The fee comes out of the buyer's own refund, not the seller.
pub fn build_refund_transaction(
    funding_tx_hash: &TxHash,
    buyer_lock: &Script,
    amount: u64,
    duration_secs: u64,
) -> Result<Transaction> {
    if amount <= ESTIMATED_FEE {
        return Err(TxError::BelowFee { amount, fee: ESTIMATED_FEE });
    }

    Ok(Transaction {
        version: 0,
        cell_deps: vec![MULTISIG_DEP],
        inputs: vec![CellInput {
            previous_output: OutPoint {
                tx_hash: *funding_tx_hash,
                index: 0,
            },
            since: since_relative_seconds(duration_secs),
        }],
        outputs: vec![CellOutput {
            capacity: amount - ESTIMATED_FEE,
            lock: buyer_lock.clone(),
        }],
        witnesses: vec![Witness2of2::placeholder()],
    })
}

/// Build a payment transaction splitting the channel capacity between
/// seller and buyer.
///
/// Invariant, verified before building: `pay_to_seller + pay_to_buyer +
/// ESTIMATED_FEE == channel_amount`.
pub fn build_payment_transaction(
    funding_tx_hash: &TxHash,
    seller_lock: &Script,
    buyer_lock: &Script,
    pay_to_seller: u64,
    pay_to_buyer: u64,
    channel_amount: u64,
) -> Result<Transaction> {
    let outputs_total = pay_to_seller
        .checked_add(pay_to_buyer)
        .ok_or(TxError::Unbalanced {
            inputs: channel_amount,
            outputs: u64::MAX,
            fee: ESTIMATED_FEE,
        })?;
    if outputs_total.saturating_add(ESTIMATED_FEE) != channel_amount {
        return Err(TxError::Unbalanced {
            inputs: channel_amount,
            outputs: outputs_total,
            fee: ESTIMATED_FEE,
        });
    }

    Ok(Transaction {
        version: 0,
        cell_deps: vec![MULTISIG_DEP],
        inputs: vec![CellInput {
            previous_output: OutPoint {
                tx_hash: *funding_tx_hash,
                index: 0,
            },
            since: 0,
        }],
        outputs: vec![
            CellOutput {
                capacity: pay_to_seller,
                lock: seller_lock.clone(),
            },
            CellOutput {
                capacity: pay_to_buyer,
                lock: buyer_lock.clone(),
            },
        ],
        witnesses: vec![Witness2of2::placeholder()],
    })
}
