//! Sweep bodies: auto-settle and expire.
//!
//! Each run writes exactly one append-only task log row, whatever happens
//! to individual channels along the way. A channel failing to settle
//! demotes the run to `completed_with_errors`; it never aborts the batch.

use std::sync::Arc;
use std::time::Instant;

use rusqlite::Connection;
use tokio::sync::Mutex;

use tollgate_channel::{ChannelError, ChannelManager};
use tollgate_db::queries::task_logs;
use tollgate_types::now_secs;
use tollgate_types::task::{TaskLog, TaskStatus};

pub const AUTO_SETTLE_TASK: &str = "auto_settle";
pub const EXPIRE_TASK: &str = "expire_channels";

/// Settle ACTIVE channels that are inside the pre-expiry warning window.
///
/// Channels with no paid chunk are skipped, not failed: a channel the buyer
/// never paid on has nothing to settle and expires on its own.
pub async fn auto_settle_sweep(
    manager: &ChannelManager,
    db: &Arc<Mutex<Connection>>,
    warning_window_secs: u64,
) -> anyhow::Result<TaskLog> {
    let started_at = now_secs();
    let timer = Instant::now();

    let expiring = manager.expiring_within(warning_window_secs).await?;
    let checked_count = expiring.len() as u64;
    let mut settled_count = 0u64;
    let mut failures = 0u64;
    let mut details = Vec::with_capacity(expiring.len());

    for channel in &expiring {
        match manager.settle(&channel.channel_id).await {
            Ok(outcome) => {
                settled_count += 1;
                details.push(serde_json::json!({
                    "channel_id": channel.channel_id,
                    "outcome": "settled",
                    "tx_hash": hex::encode(outcome.tx_hash),
                    "cumulative_payment": outcome.cumulative_payment,
                }));
            }
            Err(ChannelError::NoPayment) => {
                details.push(serde_json::json!({
                    "channel_id": channel.channel_id,
                    "outcome": "skipped",
                    "reason": "no paid chunk",
                }));
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(
                    channel_id = %channel.channel_id,
                    error = %e,
                    "auto-settle failed for channel"
                );
                details.push(serde_json::json!({
                    "channel_id": channel.channel_id,
                    "outcome": "failed",
                    "error": e.to_string(),
                }));
            }
        }
    }

    let status = if failures > 0 {
        TaskStatus::CompletedWithErrors
    } else {
        TaskStatus::Completed
    };
    let log = TaskLog {
        task_name: AUTO_SETTLE_TASK.to_string(),
        status,
        started_at,
        completed_at: now_secs(),
        duration_ms: timer.elapsed().as_millis() as u64,
        checked_count,
        affected_count: settled_count,
        detail: serde_json::json!({ "channels": details }),
    };

    let conn = db.lock().await;
    task_logs::insert(&conn, &log)?;
    drop(conn);

    tracing::info!(
        checked = checked_count,
        settled = settled_count,
        failures,
        "auto-settle sweep complete"
    );
    Ok(log)
}

/// Batch-expire elapsed ACTIVE channels. Makes no ledger calls.
pub async fn expire_sweep(
    manager: &ChannelManager,
    db: &Arc<Mutex<Connection>>,
) -> anyhow::Result<TaskLog> {
    let started_at = now_secs();
    let timer = Instant::now();

    let expired = manager.expire_due().await? as u64;

    let log = TaskLog {
        task_name: EXPIRE_TASK.to_string(),
        status: TaskStatus::Completed,
        started_at,
        completed_at: now_secs(),
        duration_ms: timer.elapsed().as_millis() as u64,
        checked_count: expired,
        affected_count: expired,
        detail: serde_json::json!({ "expired_count": expired }),
    };

    let conn = db.lock().await;
    task_logs::insert(&conn, &log)?;
    drop(conn);

    if expired > 0 {
        tracing::info!(expired, "expire sweep complete");
    }
    Ok(log)
}
