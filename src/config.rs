use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::limits::LimitSpec;

/// Locations searched when no `--config` is given. The container mount wins
/// over the working-directory copy.
pub const CONFIG_CANDIDATES: [&str; 2] = ["/config/config.yaml", "config/config.yaml"];

/// Main watchdog configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    /// Media server connection
    pub server: ServerConfig,

    /// Usage statistics backend
    #[serde(default)]
    pub stats: StatsConfig,

    /// Limit enforcement settings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Folder backup file
    #[serde(default)]
    pub backup: BackupConfig,

    /// Dashboard defaults
    #[serde(default)]
    pub view: ViewConfig,

    /// Client address restrictions for the view/admin endpoints
    #[serde(default)]
    pub access: AccessConfig,

    /// HTTP listener and outbound request settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// Media server connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL, e.g. `http://jellyfin:8096`
    #[serde(default, deserialize_with = "empty_as_none")]
    pub host: Option<String>,

    /// API token
    #[serde(default, deserialize_with = "empty_as_none")]
    pub token: Option<String>,
}

/// Which statistics plugin answers "how long did this user watch"
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatsBackend {
    /// Playback Reporting plugin, queried through the media server itself
    #[default]
    PlaybackReporting,
    /// Standalone Jellystats service
    Jellystats,
}

/// Statistics backend settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StatsConfig {
    #[serde(default)]
    pub backend: StatsBackend,

    /// Jellystats base URL (ignored for playback reporting)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub host: Option<String>,

    /// Jellystats API token (ignored for playback reporting)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub token: Option<String>,
}

/// Limit enforcement settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Limit applied to users without an override
    #[serde(default = "default_limit")]
    pub default_limit: LimitSpec,

    /// Per-user overrides keyed by user id
    #[serde(default)]
    pub user_limits: HashMap<String, LimitSpec>,

    /// Users never enforced
    #[serde(default)]
    pub no_limit_users: Vec<String>,

    /// Folders that stay visible while a user is locked
    #[serde(default)]
    pub no_limit_folders: Vec<String>,

    /// Minutes between enforcement passes (0 = only on external trigger)
    #[serde(default)]
    pub polling_interval: u64,

    /// Random delay added to each polling interval (seconds)
    #[serde(default)]
    pub polling_jitter: u64,

    /// Clear the disabled flag of every enforced account at day rollover
    #[serde(default)]
    pub account_enable_on_day_reset: bool,

    /// Upper bound for one user's enforcement step (seconds)
    #[serde(default = "default_user_timeout")]
    pub user_timeout_secs: u64,
}

/// Folder backup settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_path")]
    pub path: PathBuf,
}

/// Dashboard defaults
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ViewConfig {
    /// User shown when a session does not pick one
    #[serde(default, deserialize_with = "empty_as_none")]
    pub default_user: Option<String>,
}

/// Client address restrictions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub limit_clients: bool,

    /// Accepted IP prefixes
    #[serde(default = "default_accepted_clients")]
    pub accepted_clients: Vec<String>,
}

/// HTTP settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Listen address for trigger and view endpoints
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Timeout for each outbound request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

// Default values
fn default_limit() -> LimitSpec {
    LimitSpec::Minutes(crate::limits::FALLBACK_LIMIT_MINUTES)
}

fn default_user_timeout() -> u64 {
    60
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("config/folders_backup.json")
}

fn default_accepted_clients() -> Vec<String> {
    vec!["127.0.0.".to_string(), "192.168.".to_string(), "10.".to_string()]
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// An empty string in the YAML means "not set"
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            user_limits: HashMap::new(),
            no_limit_users: Vec::new(),
            no_limit_folders: Vec::new(),
            polling_interval: 0,
            polling_jitter: 0,
            account_enable_on_day_reset: false,
            user_timeout_secs: default_user_timeout(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: default_backup_path(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            limit_clients: false,
            accepted_clients: default_accepted_clients(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AccessConfig {
    /// Check whether a peer address may use the restricted endpoints
    pub fn is_access_granted(&self, ip: &str) -> bool {
        if !self.limit_clients {
            return true;
        }
        self.accepted_clients
            .iter()
            .any(|accepted| ip.starts_with(accepted.as_str()))
    }
}

impl WatchdogConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: WatchdogConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML")?;

        validate_config(&config)?;

        Ok(config)
    }

    /// Media server base URL without a trailing slash
    pub fn server_host(&self) -> Result<&str> {
        self.server
            .host
            .as_deref()
            .map(|h| h.trim_end_matches('/'))
            .context("server.host is not configured")
    }

    /// Media server API token
    pub fn server_token(&self) -> Result<&str> {
        self.server
            .token
            .as_deref()
            .context("server.token is not configured")
    }

    /// Parsed HTTP listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.http
            .bind
            .parse()
            .with_context(|| format!("Invalid http.bind address: {}", self.http.bind))
    }
}

/// Resolve the config path: an explicit path, else the first existing candidate
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    CONFIG_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .with_context(|| format!("{} - not found", CONFIG_CANDIDATES.join(", ")))
}

/// Load configuration from YAML file
pub fn load_config(path: &Path) -> Result<WatchdogConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    WatchdogConfig::from_yaml_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Validate configuration
pub fn validate_config(config: &WatchdogConfig) -> Result<()> {
    let host = config.server_host()?;
    validate_http_url(host).context("Invalid server.host")?;
    config.server_token()?;

    if config.stats.backend == StatsBackend::Jellystats {
        let host = config
            .stats
            .host
            .as_deref()
            .context("stats.host is required for the jellystats backend")?;
        validate_http_url(host).context("Invalid stats.host")?;

        if config.stats.token.is_none() {
            anyhow::bail!("stats.token is required for the jellystats backend");
        }
    }

    config.bind_addr()?;

    if config.http.request_timeout_secs == 0 {
        anyhow::bail!("http.request_timeout_secs must be greater than 0");
    }

    if config.limits.user_timeout_secs == 0 {
        anyhow::bail!("limits.user_timeout_secs must be greater than 0");
    }

    // Malformed limits fall back at runtime; only report them here
    if !config.limits.default_limit.is_well_formed() {
        tracing::warn!(
            "limits.default_limit has an unsupported shape, {} minutes will be used",
            crate::limits::FALLBACK_LIMIT_MINUTES
        );
    }
    for (user_id, spec) in &config.limits.user_limits {
        if !spec.is_well_formed() {
            tracing::warn!(
                "limits.user_limits.{} has an unsupported shape, the default limit will be used",
                user_id
            );
        }
    }

    Ok(())
}

fn validate_http_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).with_context(|| format!("Not a URL: {}", raw))?;

    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("URL must use http or https (got: {})", url.scheme());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  host: http://jellyfin:8096/
  token: abc123
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = WatchdogConfig::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.server_host().unwrap(), "http://jellyfin:8096");
        assert_eq!(config.stats.backend, StatsBackend::PlaybackReporting);
        assert_eq!(config.limits.default_limit, LimitSpec::Minutes(60));
        assert_eq!(config.limits.polling_interval, 0);
        assert!(!config.limits.account_enable_on_day_reset);
        assert_eq!(config.backup.path, PathBuf::from("config/folders_backup.json"));
        assert_eq!(config.http.bind, "0.0.0.0:8080");
        assert!(!config.access.limit_clients);
    }

    #[test]
    fn test_full_config_parses_limit_shapes() {
        let yaml = r#"
server:
  host: https://media.example.org
  token: abc123
stats:
  backend: jellystats
  host: http://jellystats:3000
  token: xyz
limits:
  default_limit: [90, 180]
  user_limits:
    kid1: 45
    kid2: [10, 20, 30, 40, 50, 60, 70]
  no_limit_users: [parent]
  no_limit_folders: [cartoons]
  polling_interval: 5
  account_enable_on_day_reset: true
view:
  default_user: kid1
"#;
        let config = WatchdogConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.stats.backend, StatsBackend::Jellystats);
        assert_eq!(config.limits.default_limit, LimitSpec::Schedule(vec![90, 180]));
        assert_eq!(config.limits.user_limits["kid1"], LimitSpec::Minutes(45));
        assert_eq!(config.limits.no_limit_folders, vec!["cartoons".to_string()]);
        assert_eq!(config.view.default_user.as_deref(), Some("kid1"));
    }

    #[test]
    fn test_empty_strings_are_treated_as_unset() {
        let yaml = r#"
server:
  host: http://jellyfin:8096
  token: abc123
view:
  default_user: ""
"#;
        let config = WatchdogConfig::from_yaml_str(yaml).unwrap();
        assert!(config.view.default_user.is_none());
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let yaml = r#"
server:
  host: http://jellyfin:8096
  token: ""
"#;
        assert!(WatchdogConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_non_http_host_is_rejected() {
        let yaml = r#"
server:
  host: ftp://jellyfin
  token: abc123
"#;
        assert!(WatchdogConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_jellystats_requires_its_own_host() {
        let yaml = r#"
server:
  host: http://jellyfin:8096
  token: abc123
stats:
  backend: jellystats
"#;
        assert!(WatchdogConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_malformed_limit_is_not_fatal() {
        let yaml = r#"
server:
  host: http://jellyfin:8096
  token: abc123
limits:
  user_limits:
    kid1: [1, 2, 3]
    kid2: "lots"
"#;
        let config = WatchdogConfig::from_yaml_str(yaml).unwrap();
        assert!(!config.limits.user_limits["kid1"].is_well_formed());
        assert!(!config.limits.user_limits["kid2"].is_well_formed());
    }

    #[test]
    fn test_access_granted_by_prefix() {
        let mut access = AccessConfig::default();
        assert!(access.is_access_granted("8.8.8.8"));

        access.limit_clients = true;
        assert!(access.is_access_granted("192.168.1.20"));
        assert!(access.is_access_granted("10.0.0.3"));
        assert!(!access.is_access_granted("8.8.8.8"));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/custom.yaml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
    }

    #[test]
    fn test_sample_config_parses() {
        let config: WatchdogConfig =
            serde_yaml::from_str(include_str!("../config/config.sample.yaml")).unwrap();
        assert!(config.server.token.is_none());
        assert!(config.view.default_user.is_none());
        assert_eq!(config.limits.polling_interval, 5);
        assert!(config.limits.user_limits.values().all(LimitSpec::is_well_formed));
    }
}
