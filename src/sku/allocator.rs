//! Allocation orchestrator: single-item allocation and bulk backfill.
//!
//! Each single allocation runs inside one `BEGIN IMMEDIATE` transaction:
//! load, reserve, format, write, commit. Backfill reserves one block per
//! category up front and then commits each item on its own, so a failure
//! part-way keeps everything written before it.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use super::category_code::derive_code;
use super::format::format_with;
use super::models::{AllocationOutcome, AssignedCode, Category, Item, SkuSettings};
use super::schema::{self, NameField};
use super::sequence::{self, SequenceBlock};
use crate::errors::{SkuError, SkuResult};
use crate::store::{CategoryStore, CounterStore, InventoryDb, InventoryStore};

/// Default number of attempts for a retryable failure.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound on candidate codes skipped because another item holds them.
const MAX_PROBES: u32 = 10_000;

/// Allocation context resolved once per operation: the schema's name column
/// and the settings in force.
#[derive(Debug, Clone)]
pub struct Allocator {
    name_field: NameField,
    settings: SkuSettings,
    max_attempts: u32,
}

impl Allocator {
    /// Provision supporting tables, resolve the name column and load the
    /// settings. Configuration errors surface here, before any allocation.
    pub fn prepare(db: &InventoryDb, max_attempts: u32) -> SkuResult<Self> {
        schema::ensure_tables_provisioned(db.conn())?;
        let name_field = schema::resolve_name_field(db.conn())?;
        let settings = db.sku_settings()?;
        Ok(Self::new(name_field, settings, max_attempts))
    }

    pub fn new(name_field: NameField, settings: SkuSettings, max_attempts: u32) -> Self {
        Self {
            name_field,
            settings,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn settings(&self) -> &SkuSettings {
        &self.settings
    }

    /// Allocate a code for one item and return it.
    ///
    /// An item that already has a code is rejected with
    /// [`SkuError::AlreadyAssigned`] unless `force` is set.
    pub fn allocate_one(&self, db: &mut InventoryDb, item_id: i64, force: bool) -> SkuResult<String> {
        let code = self.with_retry(|| self.try_allocate_one(db, item_id, force))?;
        info!(item_id, code = %code, "allocated SKU");
        Ok(code)
    }

    fn try_allocate_one(&self, db: &mut InventoryDb, item_id: i64, force: bool) -> SkuResult<String> {
        let tx = db.begin_write(self.name_field)?;
        let item = tx
            .get_item(item_id)?
            .ok_or(SkuError::ItemNotFound { id: item_id })?;
        if let Some(existing) = item.sku.as_deref().filter(|c| !c.is_empty()) {
            if !force {
                return Err(SkuError::AlreadyAssigned {
                    id: item.id,
                    code: existing.to_string(),
                });
            }
            warn!(item_id, previous = existing, "reassigning SKU");
        }
        let category = tx
            .get_category(item.category_id)?
            .ok_or(SkuError::CategoryNotFound {
                id: item.category_id,
            })?;

        let mut block = sequence::reserve(&tx, category.id, 1, &self.settings.suffix)?;
        let code = self.claim_code(&tx, &category, &item, &mut block)?;
        tx.write_code(item.id, &code)?;
        tx.commit()?;
        Ok(code)
    }

    /// Allocate codes for every item that lacks one.
    ///
    /// Items are processed by category name, then item name. Items whose
    /// category no longer exists are skipped with a warning. On a write
    /// failure the remaining items are abandoned and the error reports how
    /// many were already committed.
    pub fn allocate_missing(&self, db: &mut InventoryDb) -> SkuResult<AllocationOutcome> {
        let groups = {
            let tx = db.begin_read(self.name_field)?;
            let items = tx.list_items_without_code()?;
            if items.is_empty() {
                info!("no items without SKU codes");
                return Ok(AllocationOutcome::NothingToDo);
            }
            group_by_category(&tx, items)?
        };
        if groups.is_empty() {
            info!("no items without SKU codes in an existing category");
            return Ok(AllocationOutcome::NothingToDo);
        }

        let mut assigned: Vec<AssignedCode> = Vec::new();
        for (category, items) in groups {
            let result = self.backfill_category(db, &category, &items, &mut assigned);
            if let Err(e) = result {
                return Err(if assigned.is_empty() {
                    e
                } else {
                    SkuError::PartialBackfill {
                        committed: assigned.len(),
                        source: Box::new(e),
                    }
                });
            }
        }

        if assigned.is_empty() {
            info!("backfill assigned no codes");
            return Ok(AllocationOutcome::NothingToDo);
        }
        info!(count = assigned.len(), "backfill complete");
        Ok(AllocationOutcome::Backfilled {
            count: assigned.len(),
            codes: assigned,
        })
    }

    fn backfill_category(
        &self,
        db: &mut InventoryDb,
        category: &Category,
        items: &[Item],
        assigned: &mut Vec<AssignedCode>,
    ) -> SkuResult<()> {
        let suffix = &self.settings.suffix;
        let mut block = self.with_retry(|| {
            let tx = db.begin_write(self.name_field)?;
            let block = sequence::reserve(&tx, category.id, items.len() as u64, suffix)?;
            tx.commit()?;
            Ok(block)
        })?;

        for item in items {
            let written = self.with_retry(|| self.backfill_item(db, category, item, &mut block))?;
            if let Some(code) = written {
                assigned.push(AssignedCode {
                    item_id: item.id,
                    item_name: item.name.clone(),
                    code,
                });
            }
        }
        if block.remaining() > 0 {
            debug!(
                category_id = category.id,
                unused = block.remaining(),
                "reserved sequences left unused"
            );
        }
        Ok(())
    }

    /// Write one backfill code in its own transaction. Returns `None` when
    /// the item was deleted or coded by another allocator since the batch
    /// was planned.
    fn backfill_item(
        &self,
        db: &mut InventoryDb,
        category: &Category,
        item: &Item,
        block: &mut SequenceBlock,
    ) -> SkuResult<Option<String>> {
        let tx = db.begin_write(self.name_field)?;
        let Some(current) = tx.get_item(item.id)? else {
            warn!(item_id = item.id, "item was deleted; skipping");
            return Ok(None);
        };
        if current.sku.as_deref().is_some_and(|c| !c.is_empty()) {
            warn!(item_id = item.id, "item was coded concurrently; skipping");
            return Ok(None);
        }
        let code = self.claim_code(&tx, category, &current, block)?;
        match tx.write_code(item.id, &code) {
            Ok(()) => {}
            Err(SkuError::ItemNotFound { .. }) => {
                warn!(item_id = item.id, "item was deleted; skipping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        tx.commit()?;
        info!(item_id = item.id, code = %code, "allocated SKU");
        Ok(Some(code))
    }

    /// Compute the codes a backfill would assign, without writing or
    /// reserving anything.
    pub fn preview_missing(&self, db: &mut InventoryDb) -> SkuResult<Vec<AssignedCode>> {
        let tx = db.begin_read(self.name_field)?;
        let items = tx.list_items_without_code()?;
        let mut planned: HashSet<String> = HashSet::new();
        let mut preview = Vec::with_capacity(items.len());

        for (category, items) in group_by_category(&tx, items)? {
            let mut next = sequence::current_high_water(&tx, category.id, &self.settings.suffix)? + 1;
            let category_code = derive_code(&category.name);
            for item in items {
                let item_code = derive_code(&item.name);
                let code = loop {
                    let candidate = format_with(&self.settings, &category_code, &item_code, next);
                    next += 1;
                    if !planned.contains(&candidate) && !tx.code_taken(&candidate, item.id)? {
                        break candidate;
                    }
                };
                planned.insert(code.clone());
                preview.push(AssignedCode {
                    item_id: item.id,
                    item_name: item.name,
                    code,
                });
            }
        }
        Ok(preview)
    }

    /// Draw sequences from `block` until the formatted code is free.
    ///
    /// Formats that drop the category segment can collide across
    /// categories; a taken candidate is skipped rather than reused. When the
    /// block runs dry, one more sequence is reserved in the same transaction.
    fn claim_code<S>(
        &self,
        store: &S,
        category: &Category,
        item: &Item,
        block: &mut SequenceBlock,
    ) -> SkuResult<String>
    where
        S: InventoryStore + CounterStore,
    {
        let category_code = derive_code(&category.name);
        let item_code = derive_code(&item.name);
        for _ in 0..MAX_PROBES {
            let sequence = match block.next() {
                Some(n) => n,
                None => {
                    *block = sequence::reserve(store, category.id, 1, &self.settings.suffix)?;
                    continue;
                }
            };
            let candidate = format_with(&self.settings, &category_code, &item_code, sequence);
            if store.code_taken(&candidate, item.id)? {
                warn!(code = %candidate, "candidate code already taken; skipping");
                continue;
            }
            return Ok(candidate);
        }
        Err(SkuError::Persistence(anyhow::anyhow!(
            "no free code found for item {} after {} candidates",
            item.id,
            MAX_PROBES
        )))
    }

    fn with_retry<T>(&self, mut op: impl FnMut() -> SkuResult<T>) -> SkuResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "retrying allocation");
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(SkuError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Group items by category in stable order: category name, then item name,
/// ids breaking ties. Items whose category is missing are dropped with a
/// warning.
fn group_by_category<S>(store: &S, items: Vec<Item>) -> SkuResult<Vec<(Category, Vec<Item>)>>
where
    S: CategoryStore,
{
    let mut by_id: BTreeMap<i64, (Category, Vec<Item>)> = BTreeMap::new();
    for item in items {
        if !by_id.contains_key(&item.category_id) {
            match store.get_category(item.category_id)? {
                Some(category) => {
                    by_id.insert(category.id, (category, Vec::new()));
                }
                None => {
                    warn!(
                        item_id = item.id,
                        category_id = item.category_id,
                        "{}",
                        SkuError::CategoryNotFound {
                            id: item.category_id
                        }
                    );
                    continue;
                }
            }
        }
        if let Some((_, bucket)) = by_id.get_mut(&item.category_id) {
            bucket.push(item);
        }
    }

    let mut groups: Vec<(Category, Vec<Item>)> = by_id.into_values().collect();
    groups.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    for (_, items) in &mut groups {
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }
    Ok(groups)
}
