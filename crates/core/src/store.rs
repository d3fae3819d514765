//! Repository contract the ledger requires of its store.
//!
//! One trait per logical schema: perma-cache entries live in the default
//! schema, users and their keys and tags in a separate one. Implementations
//! report raw store signals through [`StoreError`] and leave their
//! interpretation to the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{ListOptions, NewPermaCacheEntry, PermaCacheEntry, PermaCacheItem, User, UserTag};

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A write violated a uniqueness constraint.
    #[error("uniqueness violation: {0}")]
    Conflict(String),

    /// A single-row query matched zero rows.
    #[error("single-row query matched no rows")]
    NoRows,

    /// Anything else the store or its transport reported.
    #[error("{message}")]
    Backend { status: Option<u16>, code: Option<String>, message: String },
}

impl StoreError {
    pub fn backend(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        StoreError::Backend { status, code, message: message.into() }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Perma-cache entries, default schema.
#[async_trait]
pub trait PermaCacheRepo: Send + Sync {
    /// Insert one row, returning it when the store echoes it back.
    async fn insert_entry(&self, entry: &NewPermaCacheEntry) -> StoreResult<Option<PermaCacheEntry>>;

    /// The active row for `(user_id, url)`.
    ///
    /// May signal absence either as `Ok(None)` or as [`StoreError::NoRows`].
    async fn find_active_entry(&self, user_id: i64, url: &str) -> StoreResult<Option<PermaCacheItem>>;

    /// Active rows for a user, ordered and limited per `opts` with `limit`
    /// already resolved by the caller.
    async fn list_active_entries(
        &self, user_id: i64, opts: &ListOptions, limit: u32,
    ) -> StoreResult<Vec<PermaCacheItem>>;

    /// Set `deleted_at` and `updated_at` on the active row for the pair.
    ///
    /// Returns the ids of the rows that were tombstoned.
    async fn tombstone_active_entry(&self, user_id: i64, url: &str, at: DateTime<Utc>) -> StoreResult<Vec<i64>>;

    /// Summed size of the user's active entries. `None` when the aggregate
    /// yields null.
    async fn used_storage(&self, user_id: i64) -> StoreResult<Option<u64>>;
}

/// Users, keys and tags, user schema.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Users whose `magic_link_id`, `github_id` or `did` equals `identity`,
    /// with active keys and tags attached. At most `limit` rows.
    async fn find_users_by_identity(&self, identity: &str, limit: u32) -> StoreResult<Vec<User>>;

    /// Active tags of a user, unvalidated.
    async fn active_user_tags(&self, user_id: i64) -> StoreResult<Vec<UserTag>>;
}
