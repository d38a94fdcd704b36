//! Snapshot endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use whosonline_core::config::client::ClientConfig;
use whosonline_core::{AppError, AppResult};

use crate::presence::snapshot::PresenceSnapshot;

use super::SnapshotSource;

/// Fetches snapshots from `GET {base_url}{snapshot_path}`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSnapshotSource {
    /// Create a source for the configured site.
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            url: join_url(&config.base_url, &config.snapshot_path),
            timeout: config.request_timeout(),
        }
    }

    /// Endpoint this source requests.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> AppResult<PresenceSnapshot> {
        tracing::debug!(url = %self.url, "Fetching presence snapshot");

        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("Snapshot endpoint returned {status}");
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                    AppError::service_unavailable(message)
                }
                StatusCode::NOT_FOUND => AppError::not_found(message),
                _ => AppError::external_service(message),
            });
        }

        let snapshot: PresenceSnapshot = response.json().await?;
        tracing::debug!(
            users = snapshot.users.len(),
            messagebus_id = snapshot.messagebus_id,
            "Fetched presence snapshot"
        );
        Ok(snapshot)
    }
}

/// Join a site root and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
