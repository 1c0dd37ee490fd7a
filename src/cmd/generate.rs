//! Code allocation command: `farmstock generate`.

use anyhow::Result;

use farmstock::config::AppConfig;
use farmstock::sku::{AllocationOutcome, AllocationTarget};

pub async fn cmd_generate(
    config: &AppConfig,
    item_id: Option<i64>,
    all_missing: bool,
    force: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let target = match (item_id, all_missing) {
        (Some(id), false) => AllocationTarget::Item { id, force },
        (None, true) => AllocationTarget::AllMissing,
        _ => anyhow::bail!("Specify either an ITEM_ID or --all-missing"),
    };
    let service = super::open_service(config)?;

    if dry_run {
        if target != AllocationTarget::AllMissing {
            anyhow::bail!("--dry-run is only supported with --all-missing");
        }
        let preview = service.preview().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        } else if preview.is_empty() {
            println!("All items already have SKU codes; nothing to do");
        } else {
            println!("Would generate {} SKU code(s):", preview.len());
            for planned in &preview {
                println!("  {:>6}  {:<30}  {}", planned.item_id, planned.item_name, planned.code);
            }
        }
        return Ok(());
    }

    let outcome = service.generate(target).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        AllocationOutcome::Assigned { code, .. } => println!("{}", code),
        AllocationOutcome::Backfilled { codes, .. } => {
            println!("{}", console::style(outcome.summary()).green());
            for assigned in codes {
                println!("  {:>6}  {:<30}  {}", assigned.item_id, assigned.item_name, assigned.code);
            }
        }
        AllocationOutcome::NothingToDo => println!("{}", console::style(outcome.summary()).dim()),
    }
    Ok(())
}
