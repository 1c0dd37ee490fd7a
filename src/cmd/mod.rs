//! CLI command implementations.
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `init`      | `Init`           |
//! | `configure` | `Configure`      |
//! | `generate`  | `Generate`       |

pub mod configure;
pub mod generate;
pub mod init;

pub use configure::cmd_configure;
pub use generate::cmd_generate;
pub use init::cmd_init;

use anyhow::{Context, Result};

use farmstock::config::AppConfig;
use farmstock::sku::SkuService;
use farmstock::store::{DbHandle, InventoryDb};

/// Open the configured database, creating its parent directory if needed.
pub fn open_db(config: &AppConfig) -> Result<InventoryDb> {
    let path = &config.database.path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    InventoryDb::open(path, config.busy_timeout())
}

pub fn open_service(config: &AppConfig) -> Result<SkuService> {
    let db = open_db(config)?;
    Ok(SkuService::new(
        DbHandle::new(db),
        config.allocation.max_attempts,
    ))
}
