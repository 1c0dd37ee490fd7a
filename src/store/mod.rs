//! Persistence seams consumed by the allocation engine.
//!
//! The engine only talks to storage through these traits. `StoreTx` in
//! [`db`] implements all three on top of a SQLite transaction, so a single
//! allocation reads, reserves and writes under one lock.

pub mod db;

use crate::errors::SkuResult;
use crate::sku::models::{Category, Item};

pub use db::{DbHandle, InventoryDb, StoreTx};

pub trait InventoryStore {
    fn get_item(&self, id: i64) -> SkuResult<Option<Item>>;

    /// Items whose code is NULL or empty, in id order.
    fn list_items_without_code(&self) -> SkuResult<Vec<Item>>;

    /// Every non-empty code currently held by an item of `category_id`.
    fn issued_codes(&self, category_id: i64) -> SkuResult<Vec<String>>;

    /// Whether `code` is held by any item other than `except_item`.
    fn code_taken(&self, code: &str, except_item: i64) -> SkuResult<bool>;

    /// Persist `code` for item `id`. A unique-index collision surfaces as
    /// `SkuError::DuplicateCode`, anything else as `SkuError::Persistence`.
    fn write_code(&self, id: i64, code: &str) -> SkuResult<()>;
}

pub trait CategoryStore {
    fn get_category(&self, id: i64) -> SkuResult<Option<Category>>;
}

/// Persisted per-category sequence counters.
pub trait CounterStore {
    fn load_counter(&self, category_id: i64) -> SkuResult<Option<u64>>;
    fn store_counter(&self, category_id: i64, last_value: u64) -> SkuResult<()>;
}
