//! Ledger configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PERMACACHE_*)
//! 2. TOML config file (if PERMACACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_PAGE_SIZE;

mod validation;

pub use validation::ConfigError;

/// Ledger configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PERMACACHE_*)
/// 2. TOML config file (if PERMACACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the PostgREST endpoint.
    ///
    /// Set via PERMACACHE_ENDPOINT environment variable.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token sent with every request.
    ///
    /// Set via PERMACACHE_TOKEN environment variable.
    /// Required only when connecting to a remote store.
    #[serde(default)]
    pub token: Option<String>,

    /// Schema holding users, keys and tags.
    ///
    /// Set via PERMACACHE_USER_SCHEMA environment variable.
    #[serde(default = "default_user_schema")]
    pub user_schema: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via PERMACACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via PERMACACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Listing page size when the caller does not give one.
    ///
    /// Set via PERMACACHE_DEFAULT_PAGE_SIZE environment variable.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

fn default_endpoint() -> String {
    "http://localhost:3000".into()
}

fn default_user_schema() -> String {
    "nftstorage".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    concat!("permacache/", env!("CARGO_PKG_VERSION")).into()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            user_schema: default_user_schema(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            default_page_size: default_page_size(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file or environment cannot be
    /// parsed, or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PERMACACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PERMACACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The bearer token, for callers about to connect.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no token is configured.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "token".into(),
            hint: "Set PERMACACHE_TOKEN environment variable".into(),
        })
    }
}
