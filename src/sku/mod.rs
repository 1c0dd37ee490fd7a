//! SKU code allocation engine.
//!
//! ## Overview
//!
//! Assigns unique, human-readable codes such as `PF-FER-0001-FARM` to
//! inventory items. Each category owns a monotonic sequence; the code layout
//! (prefix, suffix, format kind) is configurable and only affects future
//! allocations.
//!
//! ## Module Map
//!
//! ```text
//! caller ──> service.rs  (SkuService: configure / generate / preview)
//!               │  DbHandle::call (blocking pool)
//!               v
//!            allocator.rs  (Allocator: allocate_one, allocate_missing)
//!               │
//!               ├─ schema.rs         resolve name column, provision tables
//!               ├─ settings.rs       sku_prefix / sku_suffix / sku_format
//!               ├─ category_code.rs  "Fertilizer" -> "FER"
//!               ├─ sequence.rs       reserve next sequence(s) per category
//!               └─ format.rs         render the code string
//!               │
//!               v
//!            store::StoreTx  (InventoryStore + CategoryStore + CounterStore)
//! ```
//!
//! ## Concurrency
//!
//! Sequence reservation and the code write happen under SQLite's write
//! lock (`BEGIN IMMEDIATE`), the counter is persisted in `sku_counters`, and
//! a partial unique index on `items.sku` rejects any duplicate that slips
//! through, which the allocator retries.

pub mod allocator;
pub mod category_code;
pub mod format;
pub mod models;
pub mod schema;
pub mod sequence;
pub mod service;
pub mod settings;

pub use allocator::Allocator;
pub use models::{AllocationOutcome, AllocationTarget, FormatKind, SkuSettings};
pub use service::SkuService;
