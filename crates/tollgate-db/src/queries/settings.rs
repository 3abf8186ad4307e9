//! Settings query functions.
//!
//! Holds out-of-band configuration such as the token/base-unit exchange
//! rate. Values are read at startup, never renegotiated at runtime.

use rusqlite::Connection;

use crate::{DbError, Result};

/// Get a setting value.
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("setting {key}")),
        other => DbError::Sqlite(other),
    })
}

/// Set (upsert) a setting value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// The configured exchange rate in base units per token.
pub fn exchange_rate(conn: &Connection) -> Result<u64> {
    let raw = get(conn, "exchange_rate")?;
    raw.parse()
        .map_err(|_| DbError::Serialization(format!("bad exchange_rate value: {raw}")))
}
