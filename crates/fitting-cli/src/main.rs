//! Fitting room CLI - upload photos, follow 3D generation and manage assets
//!
//! Provides subcommands for:
//! - `upload-cloth` / `upload-body`: generate a garment or body model from a photo
//! - `list`: show a catalog
//! - `fetch`: download a model through the asset cache
//! - `rotate`: correct a garment's orientation from a handoff reference
//! - `config`: inspect and edit stored settings

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use fitting_core::ModelAssetCache;
use fitting_core::models::{Collection, NotificationStore};
use fitting_core::services::{CatalogStore, CatalogSync, FittingBackend, HttpBackend};
use fitting_core::settings::{ClientSettings, SettingsJsonRepository, SettingsRepository};

mod adjust;
mod catalog;
mod config;
mod upload;

#[derive(Parser, Debug)]
#[command(name = "fitting-room")]
#[command(about = "Generate and manage 3D bodies and garments from photos", long_about = None)]
struct Cli {
    /// Backend origin, overrides the stored setting and FITTING_ROOM_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a 3D garment from a photo, following its progress
    #[command(name = "upload-cloth")]
    UploadCloth(upload::UploadArgs),
    /// Generate a 3D body from a photo
    #[command(name = "upload-body")]
    UploadBody(upload::UploadArgs),
    /// List the bodies or clothes catalog
    List(catalog::ListArgs),
    /// Download a model into a file
    Fetch(catalog::FetchArgs),
    /// Rotate a garment in quarter turns and save it
    Rotate(adjust::RotateArgs),
    /// Show or change stored settings
    #[command(subcommand)]
    Config(config::ConfigCommand),
}

/// Shared services for one invocation.
pub struct App {
    pub settings: ClientSettings,
    pub backend: Arc<dyn FittingBackend>,
    pub catalog: CatalogSync,
    pub notifications: NotificationStore,
}

impl App {
    fn new(settings: ClientSettings) -> Result<Self> {
        let backend: Arc<dyn FittingBackend> =
            Arc::new(HttpBackend::new(&settings).context("Failed to create HTTP client")?);
        let catalog = CatalogSync::new(backend.clone(), CatalogStore::new(), ModelAssetCache::new());
        Ok(Self {
            settings,
            backend,
            catalog,
            notifications: NotificationStore::default(),
        })
    }

    /// Print pending notifications to stderr.
    pub fn flush_notifications(&self) {
        for notification in self.notifications.drain() {
            eprintln!("[{:?}] {}", notification.level, notification.message);
        }
    }
}

fn repository(path: Option<PathBuf>) -> Result<SettingsJsonRepository> {
    match path {
        Some(path) => Ok(SettingsJsonRepository::with_path(path)),
        None => SettingsJsonRepository::new().context("Failed to locate settings file"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repository = repository(cli.config)?;

    let command = match cli.command {
        Commands::Config(command) => return config::run(&repository, command).await,
        other => other,
    };

    let settings = repository
        .load()
        .await
        .context("Failed to load settings")?
        .with_env_overrides()
        .with_api_url_override(cli.api_url);
    info!(api_url = %settings.base_url(), "Using backend");

    let app = App::new(settings)?;
    let result = match command {
        Commands::UploadCloth(args) => upload::run(&app, Collection::Clothes, args).await,
        Commands::UploadBody(args) => upload::run(&app, Collection::Bodies, args).await,
        Commands::List(args) => catalog::list(&app, args).await,
        Commands::Fetch(args) => catalog::fetch(&app, args).await,
        Commands::Rotate(args) => adjust::run(&app, args).await,
        Commands::Config(_) => Ok(()),
    };

    app.flush_notifications();
    result
}
