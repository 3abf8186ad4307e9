//! Cell-model transaction structures.
//!
//! The ledger follows a UTXO/cell model: transactions consume live cells by
//! out-point and create new ones. The canonical transaction hash is BLAKE3
//! over the CBOR encoding with witnesses cleared, so attaching or rewriting
//! witnesses never changes the hash a signature commits to.

use serde::{Deserialize, Serialize};

use crate::{CodecError, TxHash};

/// Flag bit marking a `since` value as a relative, seconds-denominated
/// timelock.
pub const SINCE_RELATIVE_FLAG: u64 = 0x8000_0000_0000_0000;

/// Encode a relative timelock of `duration_secs` as a `since` value.
pub fn since_relative_seconds(duration_secs: u64) -> u64 {
    SINCE_RELATIVE_FLAG | (duration_secs & !SINCE_RELATIVE_FLAG)
}

/// Reference to an output of a prior transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: TxHash,
    pub index: u32,
}

/// A lock script: the on-ledger contract (by code hash) plus its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub code_hash: [u8; 32],
    pub args: Vec<u8>,
}

/// A transaction input: the cell being consumed and its timelock constraint.
///
/// `since = 0` means spendable immediately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    pub previous_output: OutPoint,
    pub since: u64,
}

/// A transaction output: capacity in base units under a lock script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    pub capacity: u64,
    pub lock: Script,
}

/// A ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    /// Out-points of contract cells the lock scripts resolve against.
    pub cell_deps: Vec<OutPoint>,
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    /// One witness per input; empty until signing.
    pub witnesses: Vec<Vec<u8>>,
}

impl Transaction {
    /// Canonical transaction hash: BLAKE3 over the CBOR encoding with all
    /// witnesses cleared.
    pub fn hash(&self) -> Result<TxHash, CodecError> {
        let mut stripped = self.clone();
        stripped.witnesses = vec![Vec::new(); stripped.inputs.len()];
        let bytes = stripped.to_bytes()?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }

    /// Serialize for storage or submission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a stored or received transaction.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Total capacity of all outputs.
    pub fn outputs_capacity(&self) -> u64 {
        self.outputs.iter().map(|o| o.capacity).sum()
    }
}

/// A live (unspent) cell on the ledger, as returned by cell queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCell {
    pub out_point: OutPoint,
    pub output: CellOutput,
}
