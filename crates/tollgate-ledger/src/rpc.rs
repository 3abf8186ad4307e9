//! JSON-RPC ledger client over TCP.
//!
//! Newline-delimited JSON-RPC 2.0: one connection, one request line, one
//! response line. Transactions travel hex-encoded in their canonical byte
//! form. Callers are expected to wrap calls in [`crate::with_timeout`]; this
//! client does no timing of its own.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use async_trait::async_trait;

use tollgate_types::tx::{LiveCell, Script, Transaction};
use tollgate_types::TxHash;

use crate::{LedgerClient, LedgerError, Result};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// [`LedgerClient`] speaking newline-delimited JSON-RPC to a ledger node.
pub struct RpcLedger {
    endpoint: String,
}

impl RpcLedger {
    /// `endpoint` is a `host:port` pair.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| LedgerError::Transport(format!("connect {}: {e}", self.endpoint)))?;
        let (reader, mut writer) = stream.into_split();

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| LedgerError::Transport(format!("encode request: {e}")))?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LedgerError::Transport(format!("write: {e}")))?;

        let mut response_line = String::new();
        BufReader::new(reader)
            .read_line(&mut response_line)
            .await
            .map_err(|e| LedgerError::Transport(format!("read: {e}")))?;
        if response_line.is_empty() {
            return Err(LedgerError::Transport("connection closed".into()));
        }

        let response: RpcResponse = serde_json::from_str(&response_line)
            .map_err(|e| LedgerError::Transport(format!("decode response: {e}")))?;
        if let Some(err) = response.error {
            tracing::debug!(method, code = err.code, "ledger rpc error");
            return Err(LedgerError::Rejected(format!(
                "{} ({})",
                err.message, err.code
            )));
        }
        response
            .result
            .ok_or_else(|| LedgerError::Transport("response carried no result".into()))
    }
}

fn parse_hash(value: &serde_json::Value) -> Result<TxHash> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::Transport("expected hex hash string".into()))?;
    let raw = hex::decode(text).map_err(|e| LedgerError::Transport(format!("hash hex: {e}")))?;
    raw.try_into()
        .map_err(|_| LedgerError::Transport("hash must be 32 bytes".into()))
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<TxHash> {
        let bytes = tx.to_bytes()?;
        let result = self
            .call(
                "submit_transaction",
                serde_json::json!({ "transaction": hex::encode(bytes) }),
            )
            .await?;
        parse_hash(&result)
    }

    async fn get_transaction(&self, hash: &TxHash) -> Result<Option<Transaction>> {
        let result = self
            .call(
                "get_transaction",
                serde_json::json!({ "tx_hash": hex::encode(hash) }),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let text = result
            .as_str()
            .ok_or_else(|| LedgerError::Transport("expected hex transaction string".into()))?;
        let raw =
            hex::decode(text).map_err(|e| LedgerError::Transport(format!("tx hex: {e}")))?;
        Ok(Some(Transaction::from_bytes(&raw)?))
    }

    async fn find_spendable_cells(
        &self,
        lock: &Script,
        min_capacity: u64,
    ) -> Result<Vec<LiveCell>> {
        let result = self
            .call(
                "find_spendable_cells",
                serde_json::json!({
                    "code_hash": hex::encode(lock.code_hash),
                    "args": hex::encode(&lock.args),
                    "min_capacity": min_capacity,
                }),
            )
            .await?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::Transport(format!("decode cells: {e}")))
    }
}
