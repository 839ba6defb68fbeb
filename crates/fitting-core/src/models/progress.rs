use serde::Deserialize;

/// Coarse classification of a stream record.
///
/// The backend labels intermediate steps (`upload`, `masking`, `inference`,
/// `export`, ...); all of them are `Progress`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressStage {
    Progress,
    Complete,
    Error,
}

impl ProgressStage {
    pub fn from_label(label: &str) -> Self {
        match label {
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Progress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// One decoded `data:` record of the generation stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub progress: f64,
    pub message: String,
    pub stage: ProgressStage,
    /// Stage name exactly as sent by the backend
    pub stage_label: String,
    pub thumbnail_url: Option<String>,
    pub model_url: Option<String>,
}

/// Wire shape of a stream record. Only the parse boundary sees it.
#[derive(Debug, Deserialize)]
struct WireProgressEvent {
    progress: f64,
    #[serde(default)]
    message: String,
    stage: String,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    model_url: Option<String>,
}

impl ProgressEvent {
    /// Parse the JSON payload of a `data:` record.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        let wire: WireProgressEvent = serde_json::from_str(payload)?;
        Ok(Self {
            progress: wire.progress,
            message: wire.message,
            stage: ProgressStage::from_label(&wire.stage),
            stage_label: wire.stage,
            thumbnail_url: wire.thumbnail_url,
            model_url: wire.model_url,
        })
    }

    pub fn complete(model_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            progress: 100.0,
            message: message.into(),
            stage: ProgressStage::Complete,
            stage_label: "complete".to_string(),
            thumbnail_url: None,
            model_url: Some(model_url.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            progress: 0.0,
            message: message.into(),
            stage: ProgressStage::Error,
            stage_label: "error".to_string(),
            thumbnail_url: None,
            model_url: None,
        }
    }
}
