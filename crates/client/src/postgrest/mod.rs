//! Minimal PostgREST client.
//!
//! Covers the subset of PostgREST the ledger needs:
//!
//! - **Authentication**: `Authorization: Bearer <token>` on every request.
//! - **Schemas**: a client is bound to one schema, selected with
//!   `Accept-Profile` on reads and `Content-Profile` on writes.
//! - **Queries**: filtered, ordered and limited selects with embedded
//!   resources; inserts and updates returning their rows; RPC calls.
//! - **Errors**: non-2xx responses decode PostgREST's `{code, message,
//!   details, hint}` body into [`PostgrestError::Api`].

pub mod error;
pub mod request;
pub mod response;

pub use error::{NO_SINGLE_ROW_CODE, PostgrestError};
pub use request::{Condition, QueryBuilder};

use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("permacache/", env!("CARGO_PKG_VERSION"));

/// PostgREST client configuration.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Base URL, e.g. `https://db.example.com/rest/v1`.
    pub endpoint: String,
    /// Bearer token.
    pub token: String,
    /// Schema to target; `None` uses the server's default schema.
    pub schema: Option<String>,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            schema: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Handle to one schema of a PostgREST endpoint.
///
/// Holds no per-request state; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    base_url: String,
    schema: Option<String>,
}

impl PostgrestClient {
    /// Create a client. Performs no network I/O and does not check the token
    /// against the server.
    pub fn new(config: PostgrestConfig) -> Result<Self, PostgrestError> {
        if config.token.is_empty() {
            return Err(PostgrestError::MissingToken);
        }

        let base = url::Url::parse(&config.endpoint).map_err(|e| PostgrestError::InvalidEndpoint(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(PostgrestError::InvalidEndpoint(config.endpoint));
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| PostgrestError::InvalidHeader("authorization"))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, base_url: config.endpoint.trim_end_matches('/').to_string(), schema: config.schema })
    }

    /// Schema this client targets.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Start a query against a table or view.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(self.http.clone(), format!("{}/{}", self.base_url, table), self.schema.clone())
    }

    /// Call a database function with named arguments.
    pub fn rpc(&self, function: &str, params: serde_json::Value) -> QueryBuilder {
        QueryBuilder::new(self.http.clone(), format!("{}/rpc/{}", self.base_url, function), self.schema.clone())
            .rpc(params)
    }
}
