//! Payment channel query functions.
//!
//! Every status transition is a single conditional UPDATE guarded by the
//! currently persisted status, so a concurrent loser observes zero affected
//! rows instead of corrupting the record. Callers map `false` to a
//! stale-state error.

use rusqlite::Connection;

use tollgate_types::channel::{ChannelStatus, PaymentChannel};

use crate::{DbError, Result};

/// Insert a freshly created channel.
pub fn insert(conn: &Connection, channel: &PaymentChannel) -> Result<()> {
    conn.execute(
        "INSERT INTO payment_channels (
            channel_id, user_id, amount, duration_secs, status, consumed_tokens,
            is_default, seller_signature, refund_tx, funding_tx, settle_tx,
            tx_hash, settle_hash, created_at, verified_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        rusqlite::params![
            channel.channel_id,
            channel.user_id,
            channel.amount as i64,
            channel.duration_secs as i64,
            channel.status.as_str(),
            channel.consumed_tokens as i64,
            channel.is_default,
            channel.seller_signature,
            channel.refund_tx,
            channel.funding_tx,
            channel.settle_tx,
            channel.tx_hash.map(|h| h.to_vec()),
            channel.settle_hash.map(|h| h.to_vec()),
            channel.created_at as i64,
            channel.verified_at.map(|t| t as i64),
            channel.updated_at as i64,
        ],
    )?;
    Ok(())
}

/// Fetch a channel by id.
pub fn get(conn: &Connection, channel_id: &str) -> Result<PaymentChannel> {
    conn.query_row(
        "SELECT channel_id, user_id, amount, duration_secs, status, consumed_tokens,
                is_default, seller_signature, refund_tx, funding_tx, settle_tx,
                tx_hash, settle_hash, created_at, verified_at, updated_at
         FROM payment_channels WHERE channel_id = ?1",
        [channel_id],
        row_to_channel,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            DbError::NotFound(format!("channel {channel_id}"))
        }
        other => DbError::Sqlite(other),
    })
}

/// List a user's channels, newest first.
pub fn list_by_user(conn: &Connection, user_id: &str) -> Result<Vec<PaymentChannel>> {
    let mut stmt = conn.prepare(
        "SELECT channel_id, user_id, amount, duration_secs, status, consumed_tokens,
                is_default, seller_signature, refund_tx, funding_tx, settle_tx,
                tx_hash, settle_hash, created_at, verified_at, updated_at
         FROM payment_channels WHERE user_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map([user_id], row_to_channel)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// INACTIVE -> ACTIVE, recording the confirmed funding hash. Returns whether
/// the guarded write landed.
pub fn activate(
    conn: &Connection,
    channel_id: &str,
    tx_hash: &[u8; 32],
    make_default: bool,
    now: u64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels
         SET status = 'ACTIVE', tx_hash = ?2, is_default = ?3,
             verified_at = ?4, updated_at = ?4
         WHERE channel_id = ?1 AND status = 'INACTIVE'",
        rusqlite::params![channel_id, tx_hash.to_vec(), make_default, now as i64],
    )?;
    Ok(updated > 0)
}

/// Move all of a user's *other* INACTIVE channels to INVALID. A user keeps a
/// single pending/active channel lineage. Returns the number invalidated.
pub fn invalidate_other_inactive(
    conn: &Connection,
    user_id: &str,
    keep_channel_id: &str,
    now: u64,
) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE payment_channels SET status = 'INVALID', updated_at = ?3
         WHERE user_id = ?1 AND channel_id != ?2 AND status = 'INACTIVE'",
        rusqlite::params![user_id, keep_channel_id, now as i64],
    )?;
    Ok(updated)
}

/// Whether the user already has an ACTIVE default channel.
pub fn has_active_default(conn: &Connection, user_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payment_channels
         WHERE user_id = ?1 AND status = 'ACTIVE' AND is_default = 1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Make `channel_id` the user's sole default among ACTIVE channels.
///
/// Clearing the old default and setting the new one happen in one
/// transaction; if the target is no longer ACTIVE the whole reassignment
/// rolls back, so the previous default survives. Returns whether the
/// target row flipped.
pub fn set_default(conn: &Connection, user_id: &str, channel_id: &str, now: u64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE payment_channels SET is_default = 0, updated_at = ?2
         WHERE user_id = ?1 AND is_default = 1",
        rusqlite::params![user_id, now as i64],
    )?;
    let flipped = tx.execute(
        "UPDATE payment_channels SET is_default = 1, updated_at = ?3
         WHERE channel_id = ?1 AND user_id = ?2 AND status = 'ACTIVE'",
        rusqlite::params![channel_id, user_id, now as i64],
    )?;
    if flipped == 0 {
        // Target left ACTIVE since the caller's precheck; dropping the
        // transaction rolls the cleared default back.
        return Ok(false);
    }
    tx.commit()?;
    Ok(true)
}

/// ACTIVE -> INVALID (manual action, no settlement). Returns whether the
/// guarded write landed.
pub fn invalidate(conn: &Connection, channel_id: &str, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels SET status = 'INVALID', is_default = 0, updated_at = ?2
         WHERE channel_id = ?1 AND status = 'ACTIVE'",
        rusqlite::params![channel_id, now as i64],
    )?;
    Ok(updated > 0)
}

/// Record the chosen settlement transaction on a still-ACTIVE channel
/// before submission. A channel that is ACTIVE with these columns set is
/// settlement-pending: the submission outcome is unknown and retries must
/// resubmit exactly these bytes. Returns whether the guarded write landed.
pub fn pin_settlement(
    conn: &Connection,
    channel_id: &str,
    settle_hash: &[u8; 32],
    settle_tx: &[u8],
    now: u64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels
         SET settle_hash = ?2, settle_tx = ?3, updated_at = ?4
         WHERE channel_id = ?1 AND status = 'ACTIVE'",
        rusqlite::params![channel_id, settle_hash.to_vec(), settle_tx, now as i64],
    )?;
    Ok(updated > 0)
}

/// Drop a pinned settlement after the ledger definitively rejected it, so
/// a later attempt may settle from a newer chunk. Returns whether the
/// guarded write landed.
pub fn clear_pinned_settlement(conn: &Connection, channel_id: &str, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels
         SET settle_hash = NULL, settle_tx = NULL, updated_at = ?2
         WHERE channel_id = ?1 AND status = 'ACTIVE'",
        rusqlite::params![channel_id, now as i64],
    )?;
    Ok(updated > 0)
}

/// ACTIVE -> SETTLED with the settlement artifacts. Returns whether the
/// guarded write landed.
pub fn mark_settled(
    conn: &Connection,
    channel_id: &str,
    settle_hash: &[u8; 32],
    settle_tx: &[u8],
    now: u64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels
         SET status = 'SETTLED', settle_hash = ?2, settle_tx = ?3,
             is_default = 0, updated_at = ?4
         WHERE channel_id = ?1 AND status = 'ACTIVE'",
        rusqlite::params![channel_id, settle_hash.to_vec(), settle_tx, now as i64],
    )?;
    Ok(updated > 0)
}

/// Batch ACTIVE -> EXPIRED for channels whose duration has elapsed. Returns
/// the number expired.
pub fn expire_due(conn: &Connection, now: u64) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE payment_channels SET status = 'EXPIRED', is_default = 0, updated_at = ?1
         WHERE status = 'ACTIVE' AND created_at + duration_secs < ?1",
        rusqlite::params![now as i64],
    )?;
    Ok(updated)
}

/// ACTIVE channels whose expiry falls within `(now, now + window_secs]` —
/// the auto-settle warning window.
pub fn expiring_within(
    conn: &Connection,
    now: u64,
    window_secs: u64,
) -> Result<Vec<PaymentChannel>> {
    let mut stmt = conn.prepare(
        "SELECT channel_id, user_id, amount, duration_secs, status, consumed_tokens,
                is_default, seller_signature, refund_tx, funding_tx, settle_tx,
                tx_hash, settle_hash, created_at, verified_at, updated_at
         FROM payment_channels
         WHERE status = 'ACTIVE'
           AND created_at + duration_secs > ?1
           AND created_at + duration_secs <= ?1 + ?2
         ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![now as i64, window_secs as i64],
            row_to_channel,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Atomically increment the channel's consumed-token counter.
///
/// A single read-modify-write statement: concurrent chunk writers never
/// lose an increment.
pub fn add_consumed_tokens(
    conn: &Connection,
    channel_id: &str,
    tokens: u64,
    now: u64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels
         SET consumed_tokens = consumed_tokens + ?2, updated_at = ?3
         WHERE channel_id = ?1",
        rusqlite::params![channel_id, tokens as i64, now as i64],
    )?;
    Ok(updated > 0)
}

/// Rewrite a channel's creation time. Test support: stands in for the
/// passage of time when exercising expiry windows.
pub fn set_created_at(conn: &Connection, channel_id: &str, created_at: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payment_channels SET created_at = ?2 WHERE channel_id = ?1",
        rusqlite::params![channel_id, created_at as i64],
    )?;
    Ok(updated > 0)
}

/// Total tokens across all durably recorded chunks for the channel.
pub fn confirmed_cumulative_tokens(conn: &Connection, channel_id: &str) -> Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(tokens_count), 0) FROM chunk_payments WHERE channel_id = ?1",
        [channel_id],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

/// Map a full SELECT row to a [`PaymentChannel`].
fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentChannel> {
    let status_str: String = row.get(4)?;
    let status = ChannelStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown channel status: {status_str}").into(),
        )
    })?;
    Ok(PaymentChannel {
        channel_id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get::<_, i64>(2)? as u64,
        duration_secs: row.get::<_, i64>(3)? as u64,
        status,
        consumed_tokens: row.get::<_, i64>(5)? as u64,
        is_default: row.get(6)?,
        seller_signature: row.get(7)?,
        refund_tx: row.get(8)?,
        funding_tx: row.get(9)?,
        settle_tx: row.get(10)?,
        tx_hash: blob_to_hash(row.get::<_, Option<Vec<u8>>>(11)?, 11)?,
        settle_hash: blob_to_hash(row.get::<_, Option<Vec<u8>>>(12)?, 12)?,
        created_at: row.get::<_, i64>(13)? as u64,
        verified_at: row.get::<_, Option<i64>>(14)?.map(|t| t as u64),
        updated_at: row.get::<_, i64>(15)? as u64,
    })
}

fn blob_to_hash(
    blob: Option<Vec<u8>>,
    column: usize,
) -> rusqlite::Result<Option<[u8; 32]>> {
    match blob {
        None => Ok(None),
        Some(bytes) => bytes.try_into().map(Some).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Blob,
                "expected 32-byte hash".into(),
            )
        }),
    }
}
