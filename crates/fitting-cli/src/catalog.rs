//! Catalog subcommands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use fitting_core::CacheKey;
use fitting_core::models::{Asset, Collection};
use fitting_core::services::RefreshPolicy;
use fitting_core::services::viewer_handoff;

use crate::App;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CollectionArg {
    Bodies,
    Clothes,
}

impl From<CollectionArg> for Collection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Bodies => Collection::Bodies,
            CollectionArg::Clothes => Collection::Clothes,
        }
    }
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Which catalog to show
    #[arg(value_enum)]
    pub collection: CollectionArg,

    /// Drop cached models first, as the asset manager does on entry
    #[arg(long)]
    pub manage: bool,

    /// Show an empty list instead of the last known one when the request fails
    #[arg(long)]
    pub clear_on_error: bool,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Server path or absolute URL of the model
    pub url: String,

    /// Where to write the model; defaults to its filename in the current directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cache-busting token appended as `t=`
    #[arg(long)]
    pub bust: Option<String>,
}

pub async fn list(app: &App, args: ListArgs) -> Result<()> {
    let collection = Collection::from(args.collection);
    let policy = if args.clear_on_error {
        RefreshPolicy::ClearOnError
    } else {
        RefreshPolicy::KeepOnError
    };

    let refreshed = if args.manage {
        app.catalog.enter_asset_management(collection).await
    } else {
        app.catalog.refresh(collection, policy).await
    };
    let assets = match refreshed {
        Ok(assets) => assets,
        Err(e) => {
            // Fail soft: show what the store still holds
            eprintln!("Could not refresh {}: {}", collection, e);
            app.catalog.store().assets(collection)
        }
    };

    let default = app.catalog.store().default_selection(collection);
    for line in render_assets(&assets, default.as_ref()) {
        println!("{}", line);
    }
    Ok(())
}

/// Table rows for `assets`, with the default selection marked.
pub fn render_assets(assets: &[Asset], default: Option<&Asset>) -> Vec<String> {
    if assets.is_empty() {
        return vec!["(no assets)".to_string()];
    }
    assets
        .iter()
        .map(|asset| {
            let marker = if default.is_some_and(|d| d.url == asset.url) {
                '*'
            } else {
                ' '
            };
            let kind = if asset.is_preset { "preset" } else { "generated" };
            format!(
                "{} {:<32} {:<5} {:<9} {}",
                marker, asset.name, asset.format, kind, asset.url
            )
        })
        .collect()
}

pub async fn fetch(app: &App, args: FetchArgs) -> Result<()> {
    let key = match args.bust {
        Some(token) => CacheKey::with_bust(args.url.clone(), token),
        None => CacheKey::new(args.url.clone()),
    };
    let bytes = app
        .catalog
        .fetch_model(key)
        .await
        .with_context(|| format!("Failed to download {}", args.url))?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(viewer_handoff::filename_from_url(&args.url)));
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(path = %output.display(), size = bytes.len(), "Model saved");
    println!("{} ({} bytes)", output.display(), bytes.len());
    Ok(())
}
