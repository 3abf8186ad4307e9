//! SQL schema definitions.

/// Complete schema for the Tollgate v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Payment channels
-- ============================================================

CREATE TABLE IF NOT EXISTS payment_channels (
    channel_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount INTEGER NOT NULL,
    duration_secs INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'INACTIVE',
    consumed_tokens INTEGER NOT NULL DEFAULT 0,
    is_default INTEGER NOT NULL DEFAULT 0,
    seller_signature BLOB,
    refund_tx BLOB,
    funding_tx BLOB,
    settle_tx BLOB,
    tx_hash BLOB,
    settle_hash BLOB,
    created_at INTEGER NOT NULL,
    verified_at INTEGER,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_channels_user_status ON payment_channels(user_id, status);
CREATE INDEX IF NOT EXISTS idx_channels_status ON payment_channels(status);

-- ============================================================
-- Chunk payments (append-only; only is_paid and the attached
-- transaction fields ever transition)
-- ============================================================

CREATE TABLE IF NOT EXISTS chunk_payments (
    chunk_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    channel_id TEXT NOT NULL REFERENCES payment_channels(channel_id),
    tokens_count INTEGER NOT NULL,
    is_paid INTEGER NOT NULL DEFAULT 0,
    cumulative_payment INTEGER NOT NULL,
    remaining_balance INTEGER NOT NULL,
    transaction_data BLOB,
    buyer_signature BLOB,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_channel_paid ON chunk_payments(channel_id, is_paid, created_at);
CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunk_payments(session_id);

-- ============================================================
-- Scheduled task logs (append-only observability sink)
-- ============================================================

CREATE TABLE IF NOT EXISTS scheduled_task_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    checked_count INTEGER NOT NULL DEFAULT 0,
    affected_count INTEGER NOT NULL DEFAULT 0,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_task_logs_name_time ON scheduled_task_logs(task_name, started_at);

-- ============================================================
-- Settings
-- ============================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
