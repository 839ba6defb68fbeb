use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the stored backend origin.
pub const API_URL_ENV: &str = "FITTING_ROOM_API_URL";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Backend origin, e.g. `http://localhost:8000`
    pub api_base_url: String,
    #[serde(default = "default_max_upload_size_mb")]
    pub max_upload_size_mb: u64,
    /// Deadline for each request other than the progress stream.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pause between a completed generation and the handoff to the adjustment stage
    #[serde(default = "default_handoff_delay_ms")]
    pub handoff_delay_ms: u64,
}

fn default_max_upload_size_mb() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_handoff_delay_ms() -> u64 {
    1500
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            max_upload_size_mb: default_max_upload_size_mb(),
            request_timeout_secs: default_request_timeout_secs(),
            handoff_delay_ms: default_handoff_delay_ms(),
        }
    }
}

impl ClientSettings {
    /// Apply `FITTING_ROOM_API_URL` if it is set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_api_url_override(std::env::var(API_URL_ENV).ok())
    }

    pub fn with_api_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.api_base_url = url;
        }
        self
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handoff_delay(&self) -> Duration {
        Duration::from_millis(self.handoff_delay_ms)
    }
}
