//! SKU format settings command: `farmstock configure`.

use anyhow::Result;

use farmstock::config::AppConfig;
use farmstock::sku::{FormatKind, SkuSettings};

pub async fn cmd_configure(
    config: &AppConfig,
    prefix: Option<String>,
    suffix: Option<String>,
    format: Option<FormatKind>,
) -> Result<()> {
    let service = super::open_service(config)?;
    let current = service.settings().await?;

    if prefix.is_none() && suffix.is_none() && format.is_none() {
        print_settings(&current);
        return Ok(());
    }

    let updated = service
        .configure(SkuSettings {
            prefix: prefix.unwrap_or(current.prefix),
            suffix: suffix.unwrap_or(current.suffix),
            format: format.unwrap_or(current.format),
        })
        .await?;

    println!("{}", console::style("SKU settings saved.").green());
    print_settings(&updated);
    Ok(())
}

fn print_settings(settings: &SkuSettings) {
    println!("  prefix = \"{}\"", settings.prefix);
    println!("  suffix = \"{}\"", settings.suffix);
    println!("  format = \"{}\"", settings.format);
    println!(
        "  example: {}",
        farmstock::sku::format::format_with(settings, "CAT", "ITM", 1)
    );
}
