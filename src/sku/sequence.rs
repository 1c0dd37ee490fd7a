//! Per-category sequence resolution.
//!
//! The next sequence for a category is one past the larger of
//!
//! - the persisted counter in `sku_counters`, and
//! - the highest trailing number among codes already issued in the category
//!   (so imported or hand-entered codes are never reused).
//!
//! [`reserve`] must run inside a write transaction: it reads both values and
//! advances the counter before the transaction releases the write lock.
//! Gaps are never filled.

use tracing::debug;

use crate::errors::{SkuError, SkuResult};
use crate::store::{CounterStore, InventoryStore};

/// Extract the trailing run of ASCII digits from a code.
pub fn trailing_number(code: &str) -> SkuResult<u64> {
    let digits_start = code
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| SkuError::Validation {
            code: code.to_string(),
            reason: "no trailing number".to_string(),
        })?;
    code[digits_start..]
        .parse::<u64>()
        .map_err(|e| SkuError::Validation {
            code: code.to_string(),
            reason: e.to_string(),
        })
}

/// Like [`trailing_number`], but first strips the configured suffix when the
/// code ends with it, so `PF-FER-0007-FARM` yields 7 under suffix `-FARM`.
pub fn sequence_of(code: &str, suffix: &str) -> SkuResult<u64> {
    let body = if suffix.is_empty() {
        code
    } else {
        code.strip_suffix(suffix).unwrap_or(code)
    };
    trailing_number(body)
}

/// Highest sequence among `codes`, or 0. Codes without a usable trailing
/// number are skipped.
pub fn max_issued<I, S>(codes: I, suffix: &str) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codes
        .into_iter()
        .filter_map(|code| match sequence_of(code.as_ref(), suffix) {
            Ok(n) => Some(n),
            Err(e) => {
                debug!(error = %e, "excluding code from sequence scan");
                None
            }
        })
        .max()
        .unwrap_or(0)
}

/// Derive the next sequence purely from issued codes: `max + 1`, or 1.
///
/// This is the read half of a read-then-write; on its own it is not safe
/// against concurrent callers. Use [`reserve`] for allocation.
pub fn next_from_codes<I, S>(codes: I, suffix: &str) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    max_issued(codes, suffix).saturating_add(1)
}

/// A contiguous range of sequences owned by one allocation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceBlock {
    next: u64,
    /// Inclusive.
    last: u64,
}

impl SequenceBlock {
    /// An empty block when `count` is zero.
    pub fn new(first: u64, count: u64) -> Self {
        match count {
            0 => Self { next: 1, last: 0 },
            _ => Self {
                next: first,
                last: first.saturating_add(count - 1),
            },
        }
    }

    pub fn remaining(&self) -> u64 {
        (self.last + 1).saturating_sub(self.next)
    }
}

impl Iterator for SequenceBlock {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next > self.last {
            return None;
        }
        let value = self.next;
        self.next += 1;
        Some(value)
    }
}

/// The highest sequence already spoken for in a category.
pub fn current_high_water<S>(store: &S, category_id: i64, suffix: &str) -> SkuResult<u64>
where
    S: InventoryStore + CounterStore,
{
    let counter = store.load_counter(category_id)?.unwrap_or(0);
    let scanned = max_issued(store.issued_codes(category_id)?, suffix);
    Ok(counter.max(scanned))
}

/// Reserve `count` sequences for a category and advance its counter.
///
/// Must be called inside a write transaction (see
/// [`InventoryDb::begin_write`](crate::store::InventoryDb::begin_write)).
pub fn reserve<S>(store: &S, category_id: i64, count: u64, suffix: &str) -> SkuResult<SequenceBlock>
where
    S: InventoryStore + CounterStore,
{
    let count = count.max(1);
    let seed = current_high_water(store, category_id, suffix)?;
    let last = seed.checked_add(count).ok_or_else(|| {
        SkuError::Persistence(anyhow::anyhow!(
            "sequence space exhausted for category {}",
            category_id
        ))
    })?;
    store.store_counter(category_id, last)?;
    debug!(category_id, first = seed + 1, last, "reserved sequence block");
    Ok(SequenceBlock::new(seed + 1, count))
}
