//! Remote capabilities the enforcement engine talks to
//!
//! The media server owns accounts and their folder permissions; a separate
//! statistics backend answers how long an account watched. Both are traits
//! so the engine can be driven by in-memory fakes in tests.

mod error;
mod jellyfin;
mod jellystats;
mod playback_reporting;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;

use crate::config::{StatsBackend, WatchdogConfig};
use crate::limits::User;

pub use error::RemoteError;
pub use jellyfin::JellyfinClient;
pub use jellystats::JellystatsSource;
pub use playback_reporting::PlaybackReportingSource;

/// Aggregated watch time per user
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Seconds watched by `user_id` in the half-open day range `[start, end)`
    async fn total_seconds(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, RemoteError>;
}

/// Account and folder-permission access on the media server
#[async_trait]
pub trait MediaServerClient: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError>;

    async fn get_enabled_folders(&self, user_id: &str) -> Result<Vec<String>, RemoteError>;

    async fn get_disabled(&self, user_id: &str) -> Result<bool, RemoteError>;

    async fn set_enabled_folders(
        &self,
        user_id: &str,
        folders: &[String],
    ) -> Result<(), RemoteError>;

    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), RemoteError>;
}

#[async_trait]
impl<S: StatsSource + ?Sized> StatsSource for Arc<S> {
    async fn total_seconds(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, RemoteError> {
        (**self).total_seconds(user_id, start, end).await
    }
}

#[async_trait]
impl<M: MediaServerClient + ?Sized> MediaServerClient for Arc<M> {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        (**self).list_users().await
    }

    async fn get_enabled_folders(&self, user_id: &str) -> Result<Vec<String>, RemoteError> {
        (**self).get_enabled_folders(user_id).await
    }

    async fn get_disabled(&self, user_id: &str) -> Result<bool, RemoteError> {
        (**self).get_disabled(user_id).await
    }

    async fn set_enabled_folders(
        &self,
        user_id: &str,
        folders: &[String],
    ) -> Result<(), RemoteError> {
        (**self).set_enabled_folders(user_id, folders).await
    }

    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), RemoteError> {
        (**self).set_disabled(user_id, disabled).await
    }
}

/// Shared HTTP client for every backend
pub fn build_http_client(config: &WatchdogConfig) -> Result<Client> {
    Client::builder()
        .user_agent(format!("watchwise/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.http.request_timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

/// Build the media server client from configuration
pub fn build_media_client(config: &WatchdogConfig, client: Client) -> Result<JellyfinClient> {
    Ok(JellyfinClient::new(
        client,
        config.server_host()?,
        config.server_token()?,
    ))
}

/// Build the configured statistics backend
pub fn build_stats_source(
    config: &WatchdogConfig,
    client: Client,
) -> Result<Arc<dyn StatsSource>> {
    match config.stats.backend {
        StatsBackend::PlaybackReporting => {
            tracing::info!("Using Playback Reporting statistics");
            Ok(Arc::new(PlaybackReportingSource::new(
                client,
                config.server_host()?,
                config.server_token()?,
            )))
        }
        StatsBackend::Jellystats => {
            tracing::info!("Using Jellystats statistics");
            let host = config
                .stats
                .host
                .as_deref()
                .context("stats.host is not configured")?;
            let token = config
                .stats
                .token
                .as_deref()
                .context("stats.token is not configured")?;
            Ok(Arc::new(JellystatsSource::new(client, host, token)))
        }
    }
}

/// Media server ids are hex strings, optionally dashed; anything else is
/// refused before it reaches a URL path or query
pub(crate) fn validate_user_id(user_id: &str) -> Result<(), RemoteError> {
    let valid = !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(RemoteError::InvalidUserId(user_id.to_string()))
    }
}

/// Read a number that a backend may encode as a JSON number or a string
pub(crate) fn json_seconds(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("4f1c2a3b4c5d6e7f8a9b0c1d2e3f4a5b").is_ok());
        assert!(validate_user_id("4f1c2a3b-4c5d-6e7f-8a9b-0c1d2e3f4a5b").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("x' OR '1'='1").is_err());
        assert!(validate_user_id("../admin").is_err());
    }

    #[test]
    fn test_json_seconds_accepts_numbers_and_strings() {
        assert_eq!(json_seconds(&json!(3600)), Some(3600));
        assert_eq!(json_seconds(&json!("3600")), Some(3600));
        assert_eq!(json_seconds(&json!(" 42 ")), Some(42));
        assert_eq!(json_seconds(&json!(12.9)), Some(12));
        assert_eq!(json_seconds(&json!(null)), None);
        assert_eq!(json_seconds(&json!("")), None);
        assert_eq!(json_seconds(&json!(-5)), None);
    }

    #[test]
    fn test_build_stats_source_follows_config() {
        let yaml = r#"
server:
  host: http://jellyfin:8096
  token: abc123
stats:
  backend: jellystats
  host: http://jellystats:3000
  token: xyz
"#;
        let config = WatchdogConfig::from_yaml_str(yaml).unwrap();
        let client = build_http_client(&config).unwrap();
        assert!(build_stats_source(&config, client.clone()).is_ok());
        assert!(build_media_client(&config, client).is_ok());
    }
}
