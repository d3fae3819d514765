//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `endpoint` is not an absolute http(s) URL
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `user_schema` is empty
    /// - `default_page_size` is 0 or exceeds 1000
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::Invalid { field: "endpoint".into(), reason: e.to_string() })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid { field: "endpoint".into(), reason: "scheme must be http or https".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.user_schema.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "user_schema".into(), reason: "must not be empty".into() });
        }

        if self.default_page_size == 0 || self.default_page_size > 1000 {
            return Err(ConfigError::Invalid {
                field: "default_page_size".into(),
                reason: "must be between 1 and 1000".into(),
            });
        }

        if endpoint.scheme() == "http" && self.token.is_some() {
            tracing::warn!(
                endpoint = %self.endpoint,
                "bearer token configured for a plain http endpoint"
            );
        }

        Ok(())
    }
}
