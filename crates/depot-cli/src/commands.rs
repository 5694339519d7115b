use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use depot_datastore::{
    ConfigurationStore, DataStoreManager, DataStoreRestorer, EmbeddedDataStore,
    EmbeddedDescriptor, FileConfigurationStore, EMBEDDED_TYPE,
};
use depot_types::StoreKey;
use serde::Serialize;

use crate::cli::*;
use crate::config::DepotConfig;

pub fn run_command(cli: Cli, config: DepotConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Stores => cmd_stores(&config, &cli.format),
        Command::Restore(args) => cmd_restore(&config, &args.name),
        Command::Backup(args) => {
            let dir = args.to.unwrap_or_else(|| config.backup_dir.clone());
            cmd_backup(&config, &args.name, &dir)
        }
    }
}

#[derive(Serialize)]
struct StoreRow {
    name: String,
    #[serde(rename = "type")]
    store_type: String,
    frozen: bool,
    started: bool,
}

fn open_persistence(config: &DepotConfig) -> anyhow::Result<Arc<FileConfigurationStore>> {
    let store = FileConfigurationStore::open(&config.config_dir)
        .with_context(|| format!("opening configuration directory {}", config.config_dir.display()))?;
    Ok(Arc::new(store))
}

fn build_manager(config: &DepotConfig) -> anyhow::Result<DataStoreManager> {
    Ok(DataStoreManager::builder(open_persistence(config)?)
        .config(config.manager_config())
        .descriptor(Arc::new(EmbeddedDescriptor::default()))
        .prototype(EMBEDDED_TYPE, EmbeddedDataStore::prototype(config.embedded_config()))
        .restorer(DataStoreRestorer::new(config.restore_config()))
        .build())
}

fn started_manager(config: &DepotConfig) -> anyhow::Result<DataStoreManager> {
    let manager = build_manager(config)?;
    manager.start().context("starting data store manager")?;
    Ok(manager)
}

fn cmd_stores(config: &DepotConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let manager = started_manager(config)?;
    let rows: Vec<StoreRow> = manager
        .browse()?
        .iter()
        .map(|store| StoreRow {
            name: store.name(),
            store_type: store
                .configuration()
                .map(|c| c.store_type)
                .unwrap_or_default(),
            frozen: store.is_frozen(),
            started: store.is_started(),
        })
        .collect();
    manager.stop().context("stopping data store manager")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text if rows.is_empty() => println!("No data stores configured."),
        OutputFormat::Text => {
            for row in &rows {
                let state = if row.frozen { "frozen".blue() } else { "writable".green() };
                println!("  {}  {}  {}", row.name.bold(), row.store_type.cyan(), state);
            }
        }
    }
    Ok(())
}

fn cmd_restore(config: &DepotConfig, name: &str) -> anyhow::Result<()> {
    let key = StoreKey::new(name);
    let store = open_persistence(config)?
        .load()
        .context("loading store configurations")?
        .into_iter()
        .find(|c| c.key() == key)
        .with_context(|| format!("no data store named {name}"))?;

    let restorer = DataStoreRestorer::new(config.restore_config());
    let restored = restorer
        .maybe_restore(&store)
        .with_context(|| format!("restoring {}", store.name))?;
    if restored {
        println!("{} Restored {} from {}", "✓".green().bold(), store.name.yellow(), config.backup_dir.display());
    } else {
        println!("Nothing to restore for {}.", store.name.yellow());
    }
    Ok(())
}

fn cmd_backup(config: &DepotConfig, name: &str, dir: &Path) -> anyhow::Result<()> {
    let manager = started_manager(config)?;
    let result = manager
        .backup(name, dir)
        .with_context(|| format!("backing up {name}"));
    manager.stop().context("stopping data store manager")?;
    let archive = result?;
    println!("{} Backed up {} to {}", "✓".green().bold(), name.yellow(), archive.display());
    Ok(())
}
