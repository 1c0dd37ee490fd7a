//! Async facade over the allocation engine.
//!
//! The CLI (or any admin surface) calls `configure` and `generate`; the
//! synchronous engine runs on the blocking pool through [`DbHandle::call`].

use tracing::info;

use super::allocator::Allocator;
use super::models::{AllocationOutcome, AllocationTarget, AssignedCode, SkuSettings};
use super::settings;
use crate::errors::SkuResult;
use crate::store::DbHandle;

#[derive(Clone)]
pub struct SkuService {
    db: DbHandle,
    max_attempts: u32,
}

impl SkuService {
    pub fn new(db: DbHandle, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }

    pub async fn settings(&self) -> SkuResult<SkuSettings> {
        self.db.call(|db| db.sku_settings()).await
    }

    /// Validate and persist new allocation settings. Existing codes are
    /// left untouched.
    pub async fn configure(&self, new: SkuSettings) -> SkuResult<SkuSettings> {
        settings::validate(&new)?;
        self.db
            .call(move |db| {
                crate::sku::schema::ensure_tables_provisioned(db.conn())?;
                db.save_sku_settings(&new)?;
                info!(prefix = %new.prefix, suffix = %new.suffix, format = %new.format, "SKU settings updated");
                Ok(new)
            })
            .await
    }

    pub async fn generate(&self, target: AllocationTarget) -> SkuResult<AllocationOutcome> {
        let max_attempts = self.max_attempts;
        self.db
            .call(move |db| {
                let allocator = Allocator::prepare(db, max_attempts)?;
                match target {
                    AllocationTarget::Item { id, force } => {
                        let code = allocator.allocate_one(db, id, force)?;
                        Ok(AllocationOutcome::Assigned { item_id: id, code })
                    }
                    AllocationTarget::AllMissing => allocator.allocate_missing(db),
                }
            })
            .await
    }

    pub async fn preview(&self) -> SkuResult<Vec<AssignedCode>> {
        let max_attempts = self.max_attempts;
        self.db
            .call(move |db| Allocator::prepare(db, max_attempts)?.preview_missing(db))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SkuError;
    use crate::sku::models::FormatKind;
    use crate::store::InventoryDb;
    use crate::store::db::DEFAULT_BUSY_TIMEOUT;
    use std::collections::HashSet;

    fn service_with_items(n: usize) -> (SkuService, Vec<i64>) {
        let db = InventoryDb::new_in_memory().unwrap();
        let cat = db.create_category("Fertilizer").unwrap();
        let ids = (0..n)
            .map(|i| db.create_item(&format!("bag {}", i), cat.id).unwrap().id)
            .collect();
        (SkuService::new(DbHandle::new(db), 5), ids)
    }

    #[tokio::test]
    async fn test_configure_then_generate_single() {
        let (service, ids) = service_with_items(1);
        service
            .configure(SkuSettings {
                prefix: "PF-".into(),
                suffix: "-FARM".into(),
                format: FormatKind::CategoryNumber,
            })
            .await
            .unwrap();
        let outcome = service
            .generate(AllocationTarget::Item {
                id: ids[0],
                force: false,
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AllocationOutcome::Assigned {
                item_id: ids[0],
                code: "PF-FER-0001-FARM".into()
            }
        );
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_affix() {
        let (service, _) = service_with_items(0);
        let err = service
            .configure(SkuSettings {
                prefix: "\t".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SkuError::Configuration(_)));
        assert_eq!(service.settings().await.unwrap(), SkuSettings::default());
    }

    #[tokio::test]
    async fn test_settings_change_is_not_retroactive() {
        let (service, ids) = service_with_items(2);
        service
            .generate(AllocationTarget::Item {
                id: ids[0],
                force: false,
            })
            .await
            .unwrap();
        service
            .configure(SkuSettings {
                format: FormatKind::NumberOnly,
                ..Default::default()
            })
            .await
            .unwrap();
        let outcome = service.generate(AllocationTarget::AllMissing).await.unwrap();
        let AllocationOutcome::Backfilled { codes, .. } = outcome else {
            panic!("expected Backfilled");
        };
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "0002");

        let first = service
            .db
            .lock_sync()
            .unwrap()
            .item_code(ids[0])
            .unwrap();
        assert_eq!(first, Some("FER-0001".into()));
    }

    #[tokio::test]
    async fn test_generate_all_missing_with_nothing_to_do() {
        let (service, _) = service_with_items(0);
        let outcome = service.generate(AllocationTarget::AllMissing).await.unwrap();
        assert_eq!(outcome, AllocationOutcome::NothingToDo);
    }

    #[tokio::test]
    async fn test_preview_matches_backfill() {
        let (service, _) = service_with_items(3);
        let preview = service.preview().await.unwrap();
        let AllocationOutcome::Backfilled { codes, .. } =
            service.generate(AllocationTarget::AllMissing).await.unwrap()
        else {
            panic!("expected Backfilled");
        };
        assert_eq!(preview, codes);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_services_on_shared_file_stay_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("farm.db");
        let ids: Vec<i64> = {
            let db = InventoryDb::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            db.init().unwrap();
            let cat = db.create_category("Vegetables").unwrap();
            (0..24)
                .map(|i| db.create_item(&format!("crate {}", i), cat.id).unwrap().id)
                .collect()
        };

        // One service (and connection) per task, as separate processes would have.
        let tasks: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let path = path.clone();
                tokio::spawn(async move {
                    let db = InventoryDb::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
                    let service = SkuService::new(DbHandle::new(db), 20);
                    service
                        .generate(AllocationTarget::Item { id, force: false })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut codes = HashSet::new();
        for task in tasks {
            match task.await.unwrap() {
                AllocationOutcome::Assigned { code, .. } => {
                    assert!(codes.insert(code.clone()), "duplicate code {}", code);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(codes.len(), 24);
    }
}
