//! Upload subcommands: run one generation session and print its progress.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use fitting_core::ErrorKind;
use fitting_core::models::{Collection, GenerationSession, SelectedFile, SessionStage};
use fitting_core::services::{ControlEvent, UploadControl};

use crate::App;

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// Photo to upload (jpg, png or webp)
    pub path: PathBuf,
}

pub async fn run(app: &App, collection: Collection, args: UploadArgs) -> Result<()> {
    let file = SelectedFile::from_path(&args.path)
        .await
        .with_context(|| format!("Failed to read {}", args.path.display()))?;

    let control = UploadControl::new(
        collection,
        app.settings.clone(),
        app.backend.clone(),
        app.catalog.clone(),
        app.notifications.clone(),
    );
    let mut events = control.subscribe();
    control
        .start_upload(Some(file))
        .map_err(|e| start_error(&args.path, e))?;

    let done = control.join();
    tokio::pin!(done);
    loop {
        tokio::select! {
            _ = &mut done => break,
            _ = tokio::signal::ctrl_c() => {
                control.cancel();
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Progress output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    let session = control.snapshot();
    match session.stage() {
        SessionStage::Complete => Ok(()),
        SessionStage::Error => match session.error() {
            Some(error) => Err(error.clone().into()),
            None => bail!("Generation failed"),
        },
        SessionStage::Idle => bail!("Upload cancelled"),
        stage => bail!("Progress stream ended early (last stage: {:?})", stage),
    }
}

/// Validation failures name the rejected file; other errors pass through.
fn start_error(path: &Path, error: ErrorKind) -> anyhow::Error {
    if error.is_validation() {
        anyhow!("{} was not uploaded: {}", path.display(), error)
    } else {
        error.into()
    }
}

fn print_event(event: &ControlEvent) {
    match event {
        ControlEvent::SessionChanged(session) => println!("{}", progress_line(session)),
        ControlEvent::HandoffReady(reference) => {
            println!("Adjust orientation with: fitting-room rotate '{}'", reference);
        }
    }
}

/// One status line per published session state.
pub fn progress_line(session: &GenerationSession) -> String {
    let label = session
        .stage_label()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", session.stage()).to_lowercase());
    let mut line = format!("[{:>3.0}%] {:<11} {}", session.progress(), label, session.message());
    if session.stage() == SessionStage::Complete {
        if let Some(url) = session.result_asset_url() {
            line.push_str(&format!("\n        model: {}", url));
        }
    }
    line.trim_end().to_string()
}
