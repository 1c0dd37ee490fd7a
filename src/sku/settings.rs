//! Configuration store for the allocation settings.
//!
//! Settings live in the flat `settings` key/value table under
//! `sku_prefix`, `sku_suffix` and `sku_format`. Missing keys read as
//! defaults; the table itself is created on first use.

use rusqlite::{Connection, OptionalExtension, params};

use super::models::{FormatKind, SkuSettings};
use crate::errors::{SkuError, SkuResult};

pub const KEY_PREFIX: &str = "sku_prefix";
pub const KEY_SUFFIX: &str = "sku_suffix";
pub const KEY_FORMAT: &str = "sku_format";

/// Longest prefix or suffix accepted by [`validate`].
pub const MAX_AFFIX_LEN: usize = 32;

fn ensure_table(conn: &Connection) -> SkuResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| SkuError::Configuration(format!("Failed to create settings table: {}", e)))
}

pub fn get_setting(conn: &Connection, key: &str) -> SkuResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> SkuResult<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

/// Read the current settings, falling back to defaults per key.
pub fn load(conn: &Connection) -> SkuResult<SkuSettings> {
    ensure_table(conn)?;
    Ok(SkuSettings {
        prefix: get_setting(conn, KEY_PREFIX)?.unwrap_or_default(),
        suffix: get_setting(conn, KEY_SUFFIX)?.unwrap_or_default(),
        format: get_setting(conn, KEY_FORMAT)?
            .map(|token| FormatKind::parse_lenient(&token))
            .unwrap_or_default(),
    })
}

/// Upsert all three keys. Callers wrap this in a transaction.
pub fn save(conn: &Connection, settings: &SkuSettings) -> SkuResult<()> {
    validate(settings)?;
    ensure_table(conn)?;
    set_setting(conn, KEY_PREFIX, &settings.prefix)?;
    set_setting(conn, KEY_SUFFIX, &settings.suffix)?;
    set_setting(conn, KEY_FORMAT, settings.format.as_str())?;
    Ok(())
}

/// Reject affixes that cannot appear in a printable code.
pub fn validate(settings: &SkuSettings) -> SkuResult<()> {
    for (label, value) in [("prefix", &settings.prefix), ("suffix", &settings.suffix)] {
        if value.chars().count() > MAX_AFFIX_LEN {
            return Err(SkuError::Configuration(format!(
                "{} is longer than {} characters",
                label, MAX_AFFIX_LEN
            )));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(SkuError::Configuration(format!(
                "{} contains control characters",
                label
            )));
        }
    }
    Ok(())
}
