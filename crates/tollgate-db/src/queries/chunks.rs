//! Chunk payment query functions.

use rusqlite::Connection;

use tollgate_types::chunk::ChunkPayment;

use crate::{DbError, Result};

/// Append a chunk row.
pub fn insert(conn: &Connection, chunk: &ChunkPayment) -> Result<()> {
    conn.execute(
        "INSERT INTO chunk_payments (
            chunk_id, user_id, session_id, channel_id, tokens_count, is_paid,
            cumulative_payment, remaining_balance, transaction_data,
            buyer_signature, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            chunk.chunk_id,
            chunk.user_id,
            chunk.session_id,
            chunk.channel_id,
            chunk.tokens_count as i64,
            chunk.is_paid,
            chunk.cumulative_payment as i64,
            chunk.remaining_balance,
            chunk.transaction_data,
            chunk.buyer_signature,
            chunk.created_at as i64,
        ],
    )?;
    Ok(())
}

/// Fetch a chunk by id.
pub fn get(conn: &Connection, chunk_id: &str) -> Result<ChunkPayment> {
    conn.query_row(
        &format!("{SELECT_CHUNK} WHERE chunk_id = ?1"),
        [chunk_id],
        row_to_chunk,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("chunk {chunk_id}")),
        other => DbError::Sqlite(other),
    })
}

/// Attach the payment artifacts and flip `is_paid`, guarded by the chunk
/// being currently unpaid. Returns whether the write landed; `false` on an
/// already-paid chunk is how the caller implements idempotency.
pub fn mark_paid(
    conn: &Connection,
    chunk_id: &str,
    transaction_data: &[u8],
    buyer_signature: &[u8],
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE chunk_payments
         SET is_paid = 1, transaction_data = ?2, buyer_signature = ?3
         WHERE chunk_id = ?1 AND is_paid = 0",
        rusqlite::params![chunk_id, transaction_data, buyer_signature],
    )?;
    Ok(updated > 0)
}

/// The most recently created paid chunk for a channel — the canonical
/// settlement input, since its attached transaction pays the largest
/// cumulative amount and supersedes every earlier one.
pub fn latest_paid(conn: &Connection, channel_id: &str) -> Result<Option<ChunkPayment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_CHUNK} WHERE channel_id = ?1 AND is_paid = 1
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    ))?;
    let mut rows = stmt.query_map([channel_id], row_to_chunk)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// All chunks of one streaming session, oldest first.
pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<ChunkPayment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_CHUNK} WHERE session_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let rows = stmt
        .query_map([session_id], row_to_chunk)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

const SELECT_CHUNK: &str = "SELECT chunk_id, user_id, session_id, channel_id, tokens_count,
        is_paid, cumulative_payment, remaining_balance, transaction_data,
        buyer_signature, created_at
 FROM chunk_payments";

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkPayment> {
    Ok(ChunkPayment {
        chunk_id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        channel_id: row.get(3)?,
        tokens_count: row.get::<_, i64>(4)? as u64,
        is_paid: row.get(5)?,
        cumulative_payment: row.get::<_, i64>(6)? as u64,
        remaining_balance: row.get(7)?,
        transaction_data: row.get(8)?,
        buyer_signature: row.get(9)?,
        created_at: row.get::<_, i64>(10)? as u64,
    })
}
