use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::model::ClientSettings;

/// Repository error type - abstracts over specific implementation errors
#[derive(Debug)]
pub enum SettingsError {
    IoError(String),
    SerializationError(String),
    PathError(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::PathError(msg) => write!(f, "Path error: {}", msg),
        }
    }
}

impl std::error::Error for SettingsError {}

pub type SettingsResult<T> = Result<T, SettingsError>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait SettingsRepository: Send + Sync + 'static {
    /// Load client settings from storage, falling back to defaults when absent
    fn load(&self) -> BoxFuture<'static, SettingsResult<ClientSettings>>;

    /// Save client settings to storage
    fn save(&self, settings: ClientSettings) -> BoxFuture<'static, SettingsResult<()>>;

    /// Get the storage path (for diagnostics)
    fn storage_path(&self) -> String;
}
