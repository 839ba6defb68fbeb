//! Garment rotation stage, entered with a handoff reference.

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;

use fitting_core::models::{Axis, Collection};
use fitting_core::services::RefreshPolicy;
use fitting_core::services::viewer_handoff::{self, AdjustmentEntry};

use crate::App;
use crate::catalog::render_assets;

#[derive(Parser, Debug)]
pub struct RotateArgs {
    /// Handoff reference printed after a garment upload
    pub reference: Option<String>,

    /// Build the reference from a server path instead
    #[arg(long, conflicts_with = "reference")]
    pub model: Option<String>,

    /// Quarter turns about X
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub x: i32,

    /// Quarter turns about Y
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub y: i32,

    /// Quarter turns about Z
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub z: i32,
}

pub async fn run(app: &App, args: RotateArgs) -> Result<()> {
    let reference = match (args.reference, args.model) {
        (Some(reference), _) => Some(reference),
        (None, Some(model)) => Some(viewer_handoff::encode_url(&model).into()),
        (None, None) => None,
    };

    let mut session = match viewer_handoff::enter(reference.as_deref()) {
        AdjustmentEntry::Adjust(session) => session,
        AdjustmentEntry::RedirectToCatalog => {
            eprintln!("No garment selected, pick one from the catalog:");
            let assets = app
                .catalog
                .refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
                .await
                .unwrap_or_default();
            for line in render_assets(&assets, None) {
                println!("{}", line);
            }
            bail!("Missing or invalid handoff reference");
        }
    };

    session.step(Axis::X, args.x);
    session.step(Axis::Y, args.y);
    session.step(Axis::Z, args.z);
    let (x, y, z) = session.edit().degrees();
    println!(
        "{}: rotating X {}°, Y {}°, Z {}°",
        session.handoff().filename,
        x,
        y,
        z
    );

    session.save(app.backend.as_ref(), app.catalog.cache()).await?;
    println!("Saved.");
    // Confirmation stays on screen for the handoff delay.
    tokio::time::sleep(app.settings.handoff_delay()).await;
    let assets = app
        .catalog
        .refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
        .await?;
    info!(count = assets.len(), "Back to catalog");
    for line in render_assets(&assets, None) {
        println!("{}", line);
    }
    Ok(())
}
