//! Latch Runtime
//!
//! Boots the asset services, acquires the requested atlases, answers sprite
//! lookups and tears the cache down again.

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use latch_asset::{FsAtlasLoader, ResourceCache};
use latch_services::Settings;
use serde_json::json;

use crate::cli::Cli;

const IDLE_SWEEP_PERIOD: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(root) = cli.assets.clone() {
        settings.assets.root = root;
    }

    latch_services::logging::init(&settings.logging).context("failed to initialize logging")?;
    tracing::info!("Latch v{}", latch_asset::VERSION);

    let loader = FsAtlasLoader::new(&settings.assets.root);
    let cache = ResourceCache::new(loader, settings.assets.cache.clone());
    let sweeper = cache.spawn_idle_sweeper(IDLE_SWEEP_PERIOD);
    tracing::info!(root = %settings.assets.root.display(), ?cache, "Asset cache ready");

    let results = cache.acquire_many(&cli.addresses).await;
    let mut loaded = Vec::new();
    for (address, result) in cli.addresses.iter().zip(results) {
        match result {
            Ok(atlas) => {
                tracing::info!(address = %address, sprites = atlas.len(), "Acquired atlas");
                loaded.push(address.clone());
            }
            Err(error) => {
                tracing::warn!(error = &error as &dyn std::error::Error, "Could not acquire atlas");
            }
        }
    }

    let mut sprites = Vec::new();
    for name in &cli.sprites {
        let found = loaded
            .iter()
            .find_map(|address| cache.query(address, name).map(|s| (address, s)));
        match found {
            Some((address, sprite)) => sprites.push(json!({ "atlas": address, "sprite": sprite })),
            None => tracing::warn!(sprite = %name, "Sprite not found in any loaded atlas"),
        }
    }
    for token in &cli.tokens {
        match cache.token_sprite(&token.entity_type, token.level) {
            Some(sprite) => sprites.push(json!({ "atlas": latch_asset::TOKENS_ADDRESS, "sprite": sprite })),
            None => tracing::warn!(
                entity_type = %token.entity_type,
                level = token.level,
                "Token sprite not found"
            ),
        }
    }

    for address in &loaded {
        cache.release(address)?;
    }
    let cleared = cache.clear_all();
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    let report = json!({
        "loaded": loaded,
        "sprites": sprites,
        "cleared": cleared,
        "stats": cache.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
