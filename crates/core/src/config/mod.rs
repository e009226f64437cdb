//! Agent configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SOUS_*)
//! 2. TOML config file (if SOUS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::store::PartitionName;

mod validation;

pub use validation::ConfigError;

/// Resilience agent configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SOUS_*)
/// 2. TOML config file (if SOUS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the SQLite Content Store.
    ///
    /// Set via SOUS_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the application. Requests to any other origin are bypassed.
    ///
    /// Set via SOUS_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Version tag of this agent build, used in partition names.
    ///
    /// Set via SOUS_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Precache manifest: absolute URLs or origin-relative paths.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Path prefixes served network-first.
    #[serde(default = "default_network_first_prefixes")]
    pub network_first_prefixes: Vec<String>,

    /// Path prefix of the creation endpoint whose failed POSTs are queued.
    ///
    /// Set via SOUS_REPLAY_PATH_PREFIX environment variable.
    #[serde(default = "default_replay_path_prefix")]
    pub replay_path_prefix: String,

    /// Background retry tag that triggers queue replay.
    ///
    /// Set via SOUS_SYNC_TAG environment variable.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Icon shown on every notification.
    #[serde(default = "default_notification_icon")]
    pub notification_icon: String,

    /// Badge shown on every notification.
    #[serde(default = "default_notification_badge")]
    pub notification_badge: String,

    /// Window opened from a notification that carries no URL.
    #[serde(default = "default_notification_url")]
    pub default_notification_url: String,

    /// User-Agent string for network requests.
    ///
    /// Set via SOUS_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network timeout in milliseconds.
    ///
    /// Set via SOUS_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum response body size accepted from the network.
    ///
    /// Set via SOUS_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./sous-store.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8000".into()
}

fn default_version() -> String {
    "v1".into()
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/static/css/style.css",
        "/static/js/app.js",
        "/static/manifest.json",
        "/static/icons/icon-192x192.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_network_first_prefixes() -> Vec<String> {
    ["/api/", "/health", "/status"].into_iter().map(String::from).collect()
}

fn default_replay_path_prefix() -> String {
    "/recipes/create".into()
}

fn default_sync_tag() -> String {
    "sync-recipes".into()
}

fn default_notification_icon() -> String {
    "/static/icons/icon-192x192.png".into()
}

fn default_notification_badge() -> String {
    "/static/icons/badge-72x72.png".into()
}

fn default_notification_url() -> String {
    "/".into()
}

fn default_user_agent() -> String {
    "sous-agent/0.1".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            version: default_version(),
            precache: default_precache(),
            network_first_prefixes: default_network_first_prefixes(),
            replay_path_prefix: default_replay_path_prefix(),
            sync_tag: default_sync_tag(),
            notification_icon: default_notification_icon(),
            notification_badge: default_notification_badge(),
            default_notification_url: default_notification_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl AgentConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The parsed origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Current precache partition for this version.
    pub fn precache_partition(&self) -> PartitionName {
        PartitionName::precache(&self.version)
    }

    /// Current runtime partition for this version.
    pub fn runtime_partition(&self) -> PartitionName {
        PartitionName::runtime(&self.version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SOUS_`
    /// 2. TOML file from `SOUS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SOUS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SOUS_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
