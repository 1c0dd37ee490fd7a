use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params};

use super::{CategoryStore, CounterStore, InventoryStore};
use crate::errors::{SkuError, SkuResult};
use crate::sku::models::{Category, Item, SkuSettings};
use crate::sku::schema::{self, NameField};
use crate::sku::settings;

/// Default time a connection waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Async-safe handle to the inventory database.
///
/// Wraps `InventoryDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<InventoryDb>>,
}

impl DbHandle {
    pub fn new(db: InventoryDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with exclusive access to the database on a blocking
    /// thread. All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> SkuResult<R>
    where
        F: FnOnce(&mut InventoryDb) -> SkuResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| SkuError::LockPoisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| SkuError::Database(anyhow::Error::new(e).context("DB task panicked")))?
    }

    /// Acquire the database mutex synchronously. For start-up and tests;
    /// never call this from a hot async path.
    pub fn lock_sync(&self) -> SkuResult<std::sync::MutexGuard<'_, InventoryDb>> {
        self.inner.lock().map_err(|_| SkuError::LockPoisoned)
    }
}

pub struct InventoryDb {
    conn: Connection,
}

impl InventoryDb {
    /// Open (or create) a SQLite database at the given path.
    ///
    /// Does not create any tables; see [`InventoryDb::init`].
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        // WAL lets readers proceed while an allocation holds the write lock.
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        Self::configure(conn)
    }

    /// Create an in-memory SQLite database with the inventory schema (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self::configure(conn)?;
        db.init()?;
        Ok(db)
    }

    fn configure(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        Ok(Self { conn })
    }

    /// Create the minimal inventory tables plus everything the allocator
    /// needs. Idempotent.
    pub fn init(&self) -> SkuResult<()> {
        schema::init_inventory_schema(&self.conn)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction. `BEGIN IMMEDIATE` takes the database write
    /// lock up front, so two allocators can never read the same counter value.
    pub fn begin_write(&mut self, name_field: NameField) -> SkuResult<StoreTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx { tx, name_field })
    }

    /// Start a read-only (deferred) transaction.
    pub fn begin_read(&mut self, name_field: NameField) -> SkuResult<StoreTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(StoreTx { tx, name_field })
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn sku_settings(&self) -> SkuResult<SkuSettings> {
        settings::load(&self.conn)
    }

    pub fn save_sku_settings(&mut self, new: &SkuSettings) -> SkuResult<()> {
        let tx = self.conn.transaction()?;
        settings::save(&tx, new)?;
        tx.commit()?;
        Ok(())
    }

    // ── Seeding helpers (inventory CRUD lives elsewhere) ──────────────

    pub fn create_category(&self, name: &str) -> SkuResult<Category> {
        self.conn
            .execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn create_item(&self, name: &str, category_id: i64) -> SkuResult<Item> {
        self.conn.execute(
            "INSERT INTO items (name, category_id) VALUES (?1, ?2)",
            params![name, category_id],
        )?;
        Ok(Item {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            category_id,
            sku: None,
        })
    }

    pub fn item_code(&self, id: i64) -> SkuResult<Option<String>> {
        let code = self
            .conn
            .query_row("SELECT sku FROM items WHERE id = ?1", params![id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(code.flatten())
    }
}

/// A transaction over the inventory database, implementing the store
/// traits. Dropping it without [`StoreTx::commit`] rolls back.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
    name_field: NameField,
}

impl StoreTx<'_> {
    pub fn commit(self) -> SkuResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            category_id: row.get(2)?,
            sku: row.get(3)?,
        })
    }
}

fn to_sql_int(value: u64) -> SkuResult<i64> {
    i64::try_from(value).map_err(|_| {
        SkuError::Persistence(anyhow::anyhow!("sequence {} does not fit in SQLite", value))
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl InventoryStore for StoreTx<'_> {
    fn get_item(&self, id: i64) -> SkuResult<Option<Item>> {
        let sql = format!(
            "SELECT id, {}, category_id, sku FROM items WHERE id = ?1",
            self.name_field.column()
        );
        let item = self
            .tx
            .query_row(&sql, params![id], Self::item_from_row)
            .optional()?;
        Ok(item)
    }

    fn list_items_without_code(&self) -> SkuResult<Vec<Item>> {
        let sql = format!(
            "SELECT id, {}, category_id, sku FROM items
             WHERE sku IS NULL OR sku = ''
             ORDER BY id",
            self.name_field.column()
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let items = stmt
            .query_map([], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn issued_codes(&self, category_id: i64) -> SkuResult<Vec<String>> {
        let mut stmt = self.tx.prepare(
            "SELECT sku FROM items WHERE category_id = ?1 AND sku IS NOT NULL AND sku != ''",
        )?;
        let codes = stmt
            .query_map(params![category_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(codes)
    }

    fn code_taken(&self, code: &str, except_item: i64) -> SkuResult<bool> {
        let taken: bool = self.tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE sku = ?1 AND id != ?2)",
            params![code, except_item],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    fn write_code(&self, id: i64, code: &str) -> SkuResult<()> {
        match self
            .tx
            .execute("UPDATE items SET sku = ?2 WHERE id = ?1", params![id, code])
        {
            Ok(0) => Err(SkuError::ItemNotFound { id }),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(SkuError::DuplicateCode {
                code: code.to_string(),
            }),
            Err(e) => Err(SkuError::Persistence(
                anyhow::Error::new(e).context(format!("Failed to write code for item {}", id)),
            )),
        }
    }
}

impl CategoryStore for StoreTx<'_> {
    fn get_category(&self, id: i64) -> SkuResult<Option<Category>> {
        let category = self
            .tx
            .query_row(
                "SELECT id, name FROM categories WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(category)
    }
}

impl CounterStore for StoreTx<'_> {
    fn load_counter(&self, category_id: i64) -> SkuResult<Option<u64>> {
        let value: Option<i64> = self
            .tx
            .query_row(
                "SELECT last_value FROM sku_counters WHERE category_id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| v.max(0) as u64))
    }

    fn store_counter(&self, category_id: i64, last_value: u64) -> SkuResult<()> {
        self.tx.execute(
            "INSERT INTO sku_counters (category_id, last_value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(category_id) DO UPDATE SET
                 last_value = excluded.last_value,
                 updated_at = datetime('now')",
            params![category_id, to_sql_int(last_value)?],
        )?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database_has_all_tables() -> anyhow::Result<()> {
        let db = InventoryDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('categories', 'items', 'settings', 'sku_counters')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 4);
        Ok(())
    }

    #[test]
    fn test_create_and_get_item() -> anyhow::Result<()> {
        let mut db = InventoryDb::new_in_memory()?;
        let cat = db.create_category("Fertilizer")?;
        let item = db.create_item("Urea", cat.id)?;

        let tx = db.begin_read(NameField::default())?;
        let loaded = tx.get_item(item.id)?.expect("item exists");
        assert_eq!(loaded.name, "Urea");
        assert_eq!(loaded.category_id, cat.id);
        assert!(loaded.sku.is_none());
        assert!(tx.get_item(999)?.is_none());
        assert_eq!(tx.get_category(cat.id)?.map(|c| c.name), Some("Fertilizer".into()));
        Ok(())
    }

    #[test]
    fn test_list_items_without_code_skips_coded_items() -> anyhow::Result<()> {
        let mut db = InventoryDb::new_in_memory()?;
        let cat = db.create_category("Seeds")?;
        let a = db.create_item("Corn", cat.id)?;
        let b = db.create_item("Wheat", cat.id)?;
        let c = db.create_item("Rye", cat.id)?;
        db.conn()
            .execute("UPDATE items SET sku = 'SEE-0001' WHERE id = ?1", [b.id])?;
        db.conn()
            .execute("UPDATE items SET sku = '' WHERE id = ?1", [c.id])?;

        let tx = db.begin_read(NameField::default())?;
        let ids: Vec<i64> = tx.list_items_without_code()?.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
        assert_eq!(tx.issued_codes(cat.id)?, vec!["SEE-0001".to_string()]);
        Ok(())
    }

    #[test]
    fn test_write_code_rolls_back_without_commit() -> anyhow::Result<()> {
        let mut db = InventoryDb::new_in_memory()?;
        let cat = db.create_category("Tools")?;
        let item = db.create_item("Hoe", cat.id)?;
        {
            let tx = db.begin_write(NameField::default())?;
            tx.write_code(item.id, "TOO-0001")?;
        }
        assert_eq!(db.item_code(item.id)?, None);

        let tx = db.begin_write(NameField::default())?;
        tx.write_code(item.id, "TOO-0001")?;
        tx.commit()?;
        assert_eq!(db.item_code(item.id)?, Some("TOO-0001".into()));
        Ok(())
    }

    #[test]
    fn test_write_code_maps_unique_violation() -> anyhow::Result<()> {
        let mut db = InventoryDb::new_in_memory()?;
        let cat = db.create_category("Tools")?;
        let a = db.create_item("Hoe", cat.id)?;
        let b = db.create_item("Rake", cat.id)?;
        let tx = db.begin_write(NameField::default())?;
        tx.write_code(a.id, "TOO-0001")?;
        assert!(tx.code_taken("TOO-0001", b.id)?);
        assert!(!tx.code_taken("TOO-0001", a.id)?);
        let err = tx.write_code(b.id, "TOO-0001").unwrap_err();
        assert!(matches!(err, SkuError::DuplicateCode { .. }));
        Ok(())
    }

    #[test]
    fn test_write_code_for_missing_item_is_not_found() -> anyhow::Result<()> {
        let mut db = InventoryDb::new_in_memory()?;
        let tx = db.begin_write(NameField::default())?;
        assert!(matches!(
            tx.write_code(42, "X-0001"),
            Err(SkuError::ItemNotFound { id: 42 })
        ));
        Ok(())
    }

    #[test]
    fn test_counter_upsert() -> anyhow::Result<()> {
        let mut db = InventoryDb::new_in_memory()?;
        let tx = db.begin_write(NameField::default())?;
        assert_eq!(tx.load_counter(1)?, None);
        tx.store_counter(1, 4)?;
        tx.store_counter(1, 9)?;
        assert_eq!(tx.load_counter(1)?, Some(9));
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() {
        let db = InventoryDb::new_in_memory().unwrap();
        let handle = DbHandle::new(db);
        let cat = handle
            .call(|db| db.create_category("Feed"))
            .await
            .unwrap();
        assert_eq!(cat.name, "Feed");
        let count: i64 = handle
            .lock_sync()
            .unwrap()
            .conn()
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
