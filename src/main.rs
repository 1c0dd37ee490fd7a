use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use farmstock::config::AppConfig;
use farmstock::sku::FormatKind;

mod cmd;

#[derive(Parser)]
#[command(name = "farmstock")]
#[command(version, about = "SKU code allocation for farm inventory")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the inventory database. Overrides farmstock.toml and FARMSTOCK_DB.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to a config file (defaults to ./farmstock.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the inventory tables and SKU bookkeeping tables
    Init,
    /// Show or change the SKU format. With no flags, prints current settings
    Configure {
        /// Text placed before every code (use "" to clear)
        #[arg(long, allow_hyphen_values = true)]
        prefix: Option<String>,

        /// Text placed after every code (use "" to clear)
        #[arg(long, allow_hyphen_values = true)]
        suffix: Option<String>,

        /// Code layout: category-number, number-only, custom
        #[arg(long)]
        format: Option<FormatKind>,
    },
    /// Allocate SKU codes for one item or for every item missing one
    Generate {
        /// Item to allocate a code for
        item_id: Option<i64>,

        /// Backfill every item that has no code
        #[arg(long, conflicts_with = "item_id")]
        all_missing: bool,

        /// Replace an existing code on the item
        #[arg(long, conflicts_with = "all_missing")]
        force: bool,

        /// Show what --all-missing would assign without writing
        #[arg(long)]
        dry_run: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = AppConfig::load_or_default(cli.config.as_deref(), &cwd)?
        .with_overrides(cli.db_path.clone(), cli.verbose);

    farmstock::logging::init_logging(&config.logging)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Configure {
            prefix,
            suffix,
            format,
        } => cmd::cmd_configure(&config, prefix, suffix, format).await?,
        Commands::Generate {
            item_id,
            all_missing,
            force,
            dry_run,
            json,
        } => cmd::cmd_generate(&config, item_id, all_missing, force, dry_run, json).await?,
    }

    Ok(())
}
