//! Connection settings for the observed site.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP and message-bus client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Site root, e.g. `https://forum.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the snapshot endpoint, relative to `base_url`.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    /// Per-request timeout for snapshot fetches, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// How long the server may hold a long-poll open, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Optional JSON file holding the page-load snapshot.
    #[serde(default)]
    pub bootstrap_snapshot: Option<String>,
    /// Trust level of the signed-in viewer. `None` means anonymous.
    #[serde(default)]
    pub viewer_trust_level: Option<u8>,
    /// Requested locale for widget strings.
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Configured fallback locale.
    #[serde(default)]
    pub fallback_locale: Option<String>,
    /// Retry policy for snapshot fetches.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Long-poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            snapshot_path: default_snapshot_path(),
            request_timeout_seconds: default_request_timeout(),
            poll_timeout_seconds: default_poll_timeout(),
            bootstrap_snapshot: None,
            viewer_trust_level: None,
            locale: default_locale(),
            fallback_locale: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each failure.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Cap on any single delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_snapshot_path() -> String {
    "/whosonline/get.json".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_poll_timeout() -> u64 {
    25
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    10_000
}
