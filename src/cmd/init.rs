//! Database provisioning command: `farmstock init`.

use anyhow::Result;

use farmstock::config::AppConfig;

pub fn cmd_init(config: &AppConfig) -> Result<()> {
    let db = super::open_db(config)?;
    db.init()?;
    println!(
        "Inventory database initialized at {}",
        config.database.path.display()
    );
    Ok(())
}
