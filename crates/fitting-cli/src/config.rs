//! `config` subcommands over the settings repository.

use anyhow::{Context, Result, bail};
use clap::Subcommand;

use fitting_core::settings::{ClientSettings, SettingsRepository};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the stored settings
    Show,
    /// Print the settings file location
    Path,
    /// Store the backend origin
    SetBaseUrl { url: String },
    /// Store the upload size limit in megabytes
    SetMaxUpload { megabytes: u64 },
    /// Store the delay before handing a finished model to the rotation stage
    SetHandoffDelay { millis: u64 },
}

pub async fn run(repository: &dyn SettingsRepository, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Path => {
            println!("{}", repository.storage_path());
            return Ok(());
        }
        ConfigCommand::Show => {
            let settings = repository.load().await.context("Failed to load settings")?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        _ => {}
    }

    let settings = repository.load().await.context("Failed to load settings")?;
    let settings = apply(settings, command)?;
    repository
        .save(settings)
        .await
        .context("Failed to save settings")?;
    println!("Saved to {}", repository.storage_path());
    Ok(())
}

fn apply(mut settings: ClientSettings, command: ConfigCommand) -> Result<ClientSettings> {
    match command {
        ConfigCommand::SetBaseUrl { url } => {
            let url = url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("Base URL must start with http:// or https://");
            }
            settings.api_base_url = url.to_string();
        }
        ConfigCommand::SetMaxUpload { megabytes } => {
            if megabytes == 0 {
                bail!("Upload limit must be at least 1 MB");
            }
            settings.max_upload_size_mb = megabytes;
        }
        ConfigCommand::SetHandoffDelay { millis } => settings.handoff_delay_ms = millis,
        ConfigCommand::Show | ConfigCommand::Path => {}
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitting_core::settings::SettingsJsonRepository;

    #[test]
    fn test_apply_validates_input() {
        let settings = ClientSettings::default();
        assert!(
            apply(
                settings.clone(),
                ConfigCommand::SetBaseUrl {
                    url: "localhost".into()
                }
            )
            .is_err()
        );
        assert!(apply(settings.clone(), ConfigCommand::SetMaxUpload { megabytes: 0 }).is_err());

        let updated = apply(
            settings,
            ConfigCommand::SetBaseUrl {
                url: " https://fit.example.com/ ".into(),
            },
        )
        .unwrap();
        assert_eq!(updated.base_url(), "https://fit.example.com");
    }

    #[tokio::test]
    async fn test_set_commands_persist() {
        let dir = tempfile::tempdir().unwrap();
        let repository = SettingsJsonRepository::with_path(dir.path().join("settings.json"));

        run(&repository, ConfigCommand::SetMaxUpload { megabytes: 25 })
            .await
            .unwrap();
        run(&repository, ConfigCommand::SetHandoffDelay { millis: 0 })
            .await
            .unwrap();

        let settings = repository.load().await.unwrap();
        assert_eq!(settings.max_upload_size_mb, 25);
        assert_eq!(settings.handoff_delay_ms, 0);
        assert_eq!(settings.api_base_url, "http://localhost:8000");
    }
}
