//! Error taxonomy shared by every component of the client.

/// Errors surfaced by validation, uploads, generation, catalog and handoff
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("No file selected")]
    FileRequired,

    #[error("Unsupported file type: {0}")]
    InvalidFileType(String),

    #[error("File is {size} bytes, the limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Could not reach the server: {0}")]
    ServerConnection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Saving the rotation failed: {0}")]
    SaveFailed(String),

    #[error("An upload is already in progress")]
    SessionBusy,

    #[error("Invalid handoff reference: {0}")]
    InvalidHandoff(String),

    #[error("Catalog request failed: {0}")]
    Catalog(String),
}

impl ErrorKind {
    /// Client-side validation errors never reach the network layer.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::FileRequired | Self::InvalidFileType(_) | Self::FileTooLarge { .. }
        )
    }
}

impl From<reqwest::Error> for ErrorKind {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ErrorKind::ServerConnection(e.to_string())
        } else {
            ErrorKind::Transport(e.to_string())
        }
    }
}

pub type FittingResult<T> = Result<T, ErrorKind>;
