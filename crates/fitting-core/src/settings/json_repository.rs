use std::path::PathBuf;

use tracing::debug;

use super::model::ClientSettings;
use super::repository::{BoxFuture, SettingsError, SettingsRepository, SettingsResult};

pub struct SettingsJsonRepository {
    file_path: PathBuf,
}

impl SettingsJsonRepository {
    /// Create repository with XDG-compliant path
    pub fn new() -> SettingsResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SettingsError::PathError("Cannot determine config directory".into()))?;

        let file_path = config_dir.join("fitting-room").join("settings.json");

        Ok(Self { file_path })
    }

    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl SettingsRepository for SettingsJsonRepository {
    fn load(&self) -> BoxFuture<'static, SettingsResult<ClientSettings>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let exists = tokio::fs::try_exists(&path)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            if !exists {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(ClientSettings::default());
            }

            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            serde_json::from_str(&contents)
                .map_err(|e| SettingsError::SerializationError(e.to_string()))
        })
    }

    fn save(&self, settings: ClientSettings) -> BoxFuture<'static, SettingsResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let json = serde_json::to_string_pretty(&settings)
                .map_err(|e| SettingsError::SerializationError(e.to_string()))?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SettingsError::IoError(e.to_string()))?;
            }

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, &json)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(|e| SettingsError::IoError(e.to_string()))?;

            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.file_path.display().to_string()
    }
}
