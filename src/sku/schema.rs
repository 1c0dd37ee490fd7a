//! Schema adapter: locates the item display-name column and provisions the
//! structures the allocator relies on.
//!
//! Inventory databases in the field disagree on what the name column is
//! called. The column is resolved once, at start-up, into a [`NameField`];
//! everything downstream works with typed [`Item`](super::models::Item)s.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::{SkuError, SkuResult};

/// Recognized names for the item display-name column, in priority order.
pub const NAME_SYNONYMS: &[&str] = &["name", "item_name", "product_name", "title"];

/// The resolved display-name column of the `items` table.
///
/// Only constructible from [`NAME_SYNONYMS`], so the column name is safe to
/// splice into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameField(&'static str);

impl NameField {
    pub fn column(&self) -> &'static str {
        self.0
    }
}

impl Default for NameField {
    fn default() -> Self {
        NameField(NAME_SYNONYMS[0])
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> SkuResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn table_columns(conn: &Connection, table: &str) -> SkuResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Find the column holding item display names.
///
/// Fails with [`SkuError::Configuration`] when the `items` table is missing
/// or has none of the recognized columns; nothing may be allocated then.
pub fn resolve_name_field(conn: &Connection) -> SkuResult<NameField> {
    if !table_exists(conn, "items")? {
        return Err(SkuError::Configuration(
            "items table does not exist (run `farmstock init`)".to_string(),
        ));
    }
    let columns = table_columns(conn, "items")?;
    let field = NAME_SYNONYMS
        .iter()
        .find(|candidate| columns.iter().any(|c| c.eq_ignore_ascii_case(candidate)))
        .map(|candidate| NameField(*candidate))
        .ok_or_else(|| {
            SkuError::Configuration(format!(
                "items table has no name column (expected one of: {})",
                NAME_SYNONYMS.join(", ")
            ))
        })?;
    debug!(column = field.column(), "resolved item name column");
    Ok(field)
}

/// Create the settings and counter tables, add the `sku` column and its
/// unique index. Safe to call repeatedly.
pub fn ensure_tables_provisioned(conn: &Connection) -> SkuResult<()> {
    if !table_exists(conn, "items")? || !table_exists(conn, "categories")? {
        return Err(SkuError::Configuration(
            "inventory tables (items, categories) are missing (run `farmstock init`)".to_string(),
        ));
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS sku_counters (
            category_id INTEGER PRIMARY KEY,
            last_value INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )
    .map_err(|e| SkuError::Configuration(format!("Failed to create supporting tables: {}", e)))?;

    // Additive migration; only a "duplicate column" error is expected.
    if !table_columns(conn, "items")?.iter().any(|c| c == "sku") {
        match conn.execute("ALTER TABLE items ADD COLUMN sku TEXT", []) {
            Ok(_) => info!("added sku column to items"),
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => {
                return Err(SkuError::Configuration(format!(
                    "Failed to add sku column: {}",
                    e
                )));
            }
        }
    }

    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_items_sku
             ON items(sku)
             WHERE sku IS NOT NULL AND sku != '';
         CREATE INDEX IF NOT EXISTS idx_items_category ON items(category_id);",
    )
    .map_err(|e| {
        SkuError::Configuration(format!(
            "Failed to create unique sku index (are there duplicate codes already?): {}",
            e
        ))
    })?;
    Ok(())
}

/// Minimal inventory tables for running stand-alone.
pub fn init_inventory_schema(conn: &Connection) -> SkuResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            sku TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    ensure_tables_provisioned(conn)
}
