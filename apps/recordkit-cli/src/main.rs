use anyhow::Context;
use clap::{Parser, Subcommand};
use pollster::block_on;
use recordkit_assets::{AssetMetadata, AssetRepository, MemoryAssetStorage};
use recordkit_common::SerdeProperties;
use recordkit_repo::{MemorySingleStorage, MemoryTableStorage, SingleRepository, TableRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recordkit-cli", about = "CLI tool for recordkit editing sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Edit a keyed table and save the delta
    TableDemo {
        /// Number of rows to seed storage with
        #[arg(short, long, default_value = "3")]
        rows: u32,
        /// Make the first save fail to show that changes survive it
        #[arg(long)]
        fail_first_save: bool,
    },
    /// Edit a single settings record property by property
    SingleDemo {
        /// Volume to set before saving
        #[arg(long, default_value = "0.5")]
        volume: f64,
    },
    /// Add, move and remove assets, then save
    AssetDemo {
        /// Number of assets to add
        #[arg(short, long, default_value = "3")]
        count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    name: String,
    qty: u32,
}

impl SerdeProperties for Item {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Settings {
    nickname: String,
    volume: f64,
    fullscreen: bool,
}

impl SerdeProperties for Settings {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sprite {
    width: u32,
    height: u32,
}

impl SerdeProperties for Sprite {}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("recordkit-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", recordkit_common::crate_info());
            println!("tracking: {}", recordkit_tracking::crate_info());
            println!("repo: {}", recordkit_repo::crate_info());
            println!("assets: {}", recordkit_assets::crate_info());
        }
        Commands::TableDemo {
            rows,
            fail_first_save,
        } => table_demo(rows, fail_first_save)?,
        Commands::SingleDemo { volume } => single_demo(volume)?,
        Commands::AssetDemo { count } => asset_demo(count)?,
    }

    Ok(())
}

fn table_demo(rows: u32, fail_first_save: bool) -> anyhow::Result<()> {
    let storage = MemoryTableStorage::with_records((1..=rows).map(|k| {
        (
            k,
            Item {
                name: format!("item-{k}"),
                qty: k,
            },
        )
    }));
    let mut repo = TableRepository::new(storage);
    repo.subscribe(|dirty| println!("  has changes: {dirty}"));
    block_on(repo.initialize()).context("initialize table")?;
    println!("Table demo: {} rows loaded", repo.len());

    let new_key = rows + 1;
    repo.add(
        new_key,
        Item {
            name: "fresh".into(),
            qty: 0,
        },
    )?;
    if rows >= 1 {
        let modified = repo.set_property(&1, "qty", json!(100))?;
        println!("  row 1 qty modified: {modified}");
    }
    if rows >= 2 {
        repo.remove(&2);
    }
    for key in repo.changed_keys() {
        println!("  {key}: {}", repo.state(&key));
    }
    println!("Pending: {}", repo.change_counts());

    if fail_first_save {
        repo.storage_mut().fail_next_persist();
        match block_on(repo.save()) {
            Ok(_) => println!("Save unexpectedly succeeded"),
            Err(e) => println!("Save failed ({e}); pending: {}", repo.change_counts()),
        }
    }

    let counts = block_on(repo.save()).context("save table")?;
    println!("Saved: {counts}");
    println!(
        "Storage: {} rows after {} persist call(s)",
        repo.storage().len(),
        repo.storage().persist_calls()
    );
    Ok(())
}

fn single_demo(volume: f64) -> anyhow::Result<()> {
    let storage = MemorySingleStorage::new(Settings {
        nickname: "player".into(),
        volume: 1.0,
        fullscreen: false,
    });
    let mut repo = SingleRepository::new(storage);
    repo.subscribe(|dirty| println!("  has changes: {dirty}"));
    let loaded = block_on(repo.load()).context("load settings")?;
    println!("Single demo: loaded {loaded:?}");

    repo.track_property_change("volume", json!(volume))?;
    repo.track_property_change("fullscreen", json!(true))?;
    repo.track_property_change("fullscreen", json!(false))?;
    println!("Modified properties: {:?}", repo.modified_properties());

    let mut external = repo.baseline().cloned().unwrap_or_default();
    external.nickname = "renamed elsewhere".into();
    repo.refresh_baseline(external);
    println!("After external refresh: {:?}", repo.get());

    block_on(repo.save()).context("save settings")?;
    println!("Stored: {:?}", repo.storage().record());
    Ok(())
}

fn asset_demo(count: u32) -> anyhow::Result<()> {
    let mut repo = AssetRepository::new(MemoryAssetStorage::new());
    block_on(repo.initialize()).context("initialize assets")?;

    let mut ids = Vec::new();
    for i in 0..count {
        let sprite = Sprite {
            width: 16 << i.min(8),
            height: 16,
        };
        ids.push(repo.add(sprite, AssetMetadata::default(), &format!("sprites/s{i}.json"))?);
    }
    block_on(repo.save()).context("save new assets")?;
    println!("Asset demo: {} assets saved", repo.len());

    if let Some(&first) = ids.first() {
        block_on(repo.move_to(first, "sprites/hero.json"))?;
        block_on(repo.set_property(first, "height", json!(32)))?;
    }
    if let Some(&last) = ids.get(1..).and_then(|rest| rest.last()) {
        block_on(repo.remove(last))?;
    }
    println!("Pending: {}", repo.change_counts());

    block_on(repo.save()).context("save asset edits")?;
    for summary in repo.summaries() {
        println!(
            "  {} {:<20} name={:<8} hash={}",
            summary.id,
            summary.path,
            summary.name,
            summary
                .content_hash
                .as_deref()
                .map_or("-", |h| &h[..12])
        );
    }
    Ok(())
}
