//! Sync Engine Configuration
//!
//! Built once at startup, either from defaults or from `TEAMBOARD_*`
//! environment variables, and handed to [`crate::SyncClient::new`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the authoritative request service
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Push channel endpoint; the API URL when unset
    #[serde(default)]
    pub channel_url: Option<String>,

    /// Upper bound for every authoritative request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Capacity of the push-channel fan-out
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the client-facing event channel
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_event_buffer() -> usize {
    256
}

fn default_notification_buffer() -> usize {
    64
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            channel_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            event_buffer: default_event_buffer(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `TEAMBOARD_API_URL`, `TEAMBOARD_CHANNEL_URL`
    /// and `TEAMBOARD_REQUEST_TIMEOUT_MS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TEAMBOARD_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url;
        }
        if let Some(url) = lookup("TEAMBOARD_CHANNEL_URL").filter(|v| !v.trim().is_empty()) {
            config.channel_url = Some(url);
        }
        if let Some(raw) = lookup("TEAMBOARD_REQUEST_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.request_timeout_ms = ms,
                _ => warn!(
                    "Ignoring TEAMBOARD_REQUEST_TIMEOUT_MS={:?}, using {}ms",
                    raw, config.request_timeout_ms
                ),
            }
        }

        config.normalized()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    /// Strip trailing slashes from the URLs
    pub fn normalized(mut self) -> Self {
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        self.channel_url = self
            .channel_url
            .map(|url| url.trim().trim_end_matches('/').to_string());
        self
    }

    pub fn channel_url(&self) -> &str {
        self.channel_url.as_deref().unwrap_or(&self.api_base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
