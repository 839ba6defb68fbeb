//! Handoff of a generated garment to the manual rotation stage.
//!
//! A completed or selected asset is packed into a URL-safe reference, the
//! adjustment stage decodes it, collects quarter-turn edits and persists them
//! through the backend.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tracing::{debug, warn};

use super::backend::FittingBackend;
use crate::cache::{CacheKey, ModelAssetCache};
use crate::error::{ErrorKind, FittingResult};
use crate::models::{Axis, RotationEdit, RotationRequest};

/// Everything outside the RFC 3986 unreserved set gets escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Opaque, URL-safe pointer to an asset for the adjustment stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandoffReference(String);

impl HandoffReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandoffReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<HandoffReference> for String {
    fn from(reference: HandoffReference) -> Self {
        reference.0
    }
}

/// Decoded content of a [`HandoffReference`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handoff {
    pub asset_url: String,
    pub filename: String,
}

pub fn encode(asset_url: &str, filename: &str) -> HandoffReference {
    HandoffReference(format!(
        "model={}&filename={}",
        utf8_percent_encode(asset_url, COMPONENT),
        utf8_percent_encode(filename, COMPONENT)
    ))
}

/// Reference for a server path, with the filename taken from its last
/// segment.
pub fn encode_url(asset_url: &str) -> HandoffReference {
    encode(asset_url, &filename_from_url(asset_url))
}

pub fn decode(reference: &str) -> FittingResult<Handoff> {
    let mut asset_url = None;
    let mut filename = None;

    for pair in reference.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ErrorKind::InvalidHandoff(format!("malformed pair '{}'", pair)))?;
        let value = percent_decode_str(value)
            .decode_utf8()
            .map_err(|e| ErrorKind::InvalidHandoff(e.to_string()))?
            .into_owned();
        match key {
            "model" => asset_url = Some(value),
            "filename" => filename = Some(value),
            _ => {}
        }
    }

    match (asset_url, filename) {
        (Some(asset_url), Some(filename)) => Ok(Handoff {
            asset_url,
            filename,
        }),
        (None, _) => Err(ErrorKind::InvalidHandoff("missing model".to_string())),
        (_, None) => Err(ErrorKind::InvalidHandoff("missing filename".to_string())),
    }
}

/// Last path segment of `url` without its query or fragment.
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Persist a rotation for `filename`.
pub async fn save(
    backend: &dyn FittingBackend,
    filename: &str,
    edit: RotationEdit,
) -> FittingResult<()> {
    debug!(filename = %filename, ?edit, "Submitting rotation edit");
    backend.rotate(RotationRequest::new(filename, edit)).await
}

/// Result of entering the adjustment stage.
#[derive(Debug)]
pub enum AdjustmentEntry {
    Adjust(AdjustmentSession),
    RedirectToCatalog,
}

/// Enter the adjustment stage with an optional reference. Anything that does
/// not name both a model and a filename sends the user back to the catalog.
pub fn enter(reference: Option<&str>) -> AdjustmentEntry {
    let Some(reference) = reference.filter(|r| !r.trim().is_empty()) else {
        return AdjustmentEntry::RedirectToCatalog;
    };
    match decode(reference) {
        Ok(handoff) if !handoff.asset_url.is_empty() && !handoff.filename.is_empty() => {
            AdjustmentEntry::Adjust(AdjustmentSession::new(handoff))
        }
        Ok(_) => AdjustmentEntry::RedirectToCatalog,
        Err(e) => {
            warn!(error = %e, "Redirecting to catalog");
            AdjustmentEntry::RedirectToCatalog
        }
    }
}

/// Working state of the rotation editor for one garment.
///
/// Edits live here until `save` succeeds; dropping the session discards them.
#[derive(Debug)]
pub struct AdjustmentSession {
    handoff: Handoff,
    edit: RotationEdit,
    bust: String,
}

impl AdjustmentSession {
    pub fn new(handoff: Handoff) -> Self {
        // Fresh token per visit so the preview never comes from a stale copy.
        let bust = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
            .to_string();
        Self {
            handoff,
            edit: RotationEdit::default(),
            bust,
        }
    }

    pub fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    pub fn edit(&self) -> RotationEdit {
        self.edit
    }

    pub fn step(&mut self, axis: Axis, quarter_turns: i32) {
        self.edit.step(axis, quarter_turns);
    }

    pub fn reset(&mut self) {
        self.edit.reset();
    }

    /// Cache key of the preview model, busted for this visit.
    pub fn preview_key(&self) -> CacheKey {
        CacheKey::with_bust(self.handoff.asset_url.clone(), self.bust.clone())
    }

    /// Persist the current edit. On success every cached copy of the model is
    /// dropped and the caller goes back to the catalog; on failure the edit is
    /// kept for another attempt.
    pub async fn save(
        &self,
        backend: &dyn FittingBackend,
        cache: &ModelAssetCache<Bytes>,
    ) -> FittingResult<()> {
        save(backend, &self.handoff.filename, self.edit).await?;
        cache.invalidate(&self.handoff.asset_url);
        Ok(())
    }
}
