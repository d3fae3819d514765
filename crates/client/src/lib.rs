//! Remote store for the perma-cache ledger.
//!
//! This crate provides a PostgREST client and the ledger repositories built
//! on it. [`connect`] wires both repositories from an [`AppConfig`].

pub mod postgrest;
pub mod store;

pub use postgrest::{PostgrestClient, PostgrestConfig, PostgrestError};
pub use store::{PostgrestPermaCacheRepo, PostgrestUserRepo};

use permacache_core::{AppConfig, Ledger};

/// Ledger backed by a PostgREST endpoint.
pub type RemoteLedger = Ledger<PostgrestPermaCacheRepo, PostgrestUserRepo>;

/// Build a [`RemoteLedger`] for the configured endpoint.
///
/// Perma-cache entries are read from the endpoint's default schema and users
/// from `config.user_schema`. No request is made until the first operation.
pub fn connect(config: &AppConfig) -> Result<RemoteLedger, PostgrestError> {
    let token = config.require_token().map_err(|_| PostgrestError::MissingToken)?.to_string();

    let base = PostgrestConfig {
        endpoint: config.endpoint.clone(),
        token,
        schema: None,
        timeout: config.timeout(),
        user_agent: config.user_agent.clone(),
    };
    let users = PostgrestConfig { schema: Some(config.user_schema.clone()), ..base.clone() };

    let perma_cache = PostgrestPermaCacheRepo::new(PostgrestClient::new(base)?);
    let users = PostgrestUserRepo::new(PostgrestClient::new(users)?);

    tracing::debug!(endpoint = %config.endpoint, user_schema = %config.user_schema, "connected remote ledger");

    Ok(Ledger::new(perma_cache, users).with_default_page_size(config.default_page_size))
}
