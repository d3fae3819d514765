//! Ledger repositories backed by PostgREST.
//!
//! [`PostgrestPermaCacheRepo`] targets the default schema and
//! [`PostgrestUserRepo`] the user schema. Each wraps its own
//! [`PostgrestClient`], so a repository can only ever query its own schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use permacache_core::model::{NewPermaCacheEntry, format_timestamp};
use permacache_core::{
    ListOptions, PermaCacheEntry, PermaCacheItem, PermaCacheRepo, StoreResult, User, UserRepo, UserTag,
};

use crate::postgrest::{Condition, PostgrestClient};

const PERMA_CACHE_TABLE: &str = "perma_cache";
const USER_TABLE: &str = "user";
const USER_TAG_TABLE: &str = "user_tag";
const USED_STORAGE_FN: &str = "user_used_perma_cache_storage";

/// Projection for lookups and listings; `insertedAt` is an alias.
const ITEM_COLUMNS: &str = "
    url,
    size,
    insertedAt:inserted_at
";

/// User with active keys and tags embedded through their foreign keys.
const USER_COLUMNS: &str = "
    id,
    github_id,
    did,
    keys:auth_key_user_id_fkey(user_id,id,name,secret),
    tags:user_tag_user_id_fkey(user_id,id,tag,value)
";

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

/// Perma-cache repository over the default schema.
#[derive(Debug, Clone)]
pub struct PostgrestPermaCacheRepo {
    client: PostgrestClient,
}

impl PostgrestPermaCacheRepo {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PermaCacheRepo for PostgrestPermaCacheRepo {
    async fn insert_entry(&self, entry: &NewPermaCacheEntry) -> StoreResult<Option<PermaCacheEntry>> {
        let row = json!({
            "user_id": entry.user_id,
            "url": entry.url,
            "size": entry.size,
            "inserted_at": format_timestamp(&entry.inserted_at),
        });

        Ok(self
            .client
            .from(PERMA_CACHE_TABLE)
            .insert(row)
            .single()
            .execute()
            .await?)
    }

    async fn find_active_entry(&self, user_id: i64, url: &str) -> StoreResult<Option<PermaCacheItem>> {
        Ok(self
            .client
            .from(PERMA_CACHE_TABLE)
            .select(ITEM_COLUMNS)
            .eq("user_id", user_id)
            .eq("url", url)
            .is_null("deleted_at")
            .single()
            .execute()
            .await?)
    }

    async fn list_active_entries(
        &self, user_id: i64, opts: &ListOptions, limit: u32,
    ) -> StoreResult<Vec<PermaCacheItem>> {
        let mut query = self
            .client
            .from(PERMA_CACHE_TABLE)
            .select(ITEM_COLUMNS)
            .eq("user_id", user_id)
            .is_null("deleted_at")
            .limit(limit)
            .order(opts.sort_by.column(), opts.sort_order.is_ascending());

        if let Some(before) = &opts.before {
            query = query.lt("inserted_at", format_timestamp(before));
        }

        Ok(query.execute().await?.unwrap_or_default())
    }

    async fn tombstone_active_entry(&self, user_id: i64, url: &str, at: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        let at = format_timestamp(&at);
        let rows: Option<Vec<IdRow>> = self
            .client
            .from(PERMA_CACHE_TABLE)
            .update(json!({ "deleted_at": at, "updated_at": at }))
            .select("id")
            .eq("url", url)
            .eq("user_id", user_id)
            .is_null("deleted_at")
            .execute()
            .await?;

        Ok(rows.unwrap_or_default().into_iter().map(|r| r.id).collect())
    }

    async fn used_storage(&self, user_id: i64) -> StoreResult<Option<u64>> {
        Ok(self
            .client
            .rpc(USED_STORAGE_FN, json!({ "query_user_id": user_id }))
            .execute()
            .await?)
    }
}

/// User repository over the user schema.
#[derive(Debug, Clone)]
pub struct PostgrestUserRepo {
    client: PostgrestClient,
}

impl PostgrestUserRepo {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserRepo for PostgrestUserRepo {
    async fn find_users_by_identity(&self, identity: &str, limit: u32) -> StoreResult<Vec<User>> {
        let users: Option<Vec<User>> = self
            .client
            .from(USER_TABLE)
            .select(USER_COLUMNS)
            .or(&[
                Condition::eq("magic_link_id", identity),
                Condition::eq("github_id", identity),
                Condition::eq("did", identity),
            ])
            .filter("keys.deleted_at", "is", "null")
            .filter("tags.deleted_at", "is", "null")
            .limit(limit)
            .execute()
            .await?;

        Ok(users.unwrap_or_default())
    }

    async fn active_user_tags(&self, user_id: i64) -> StoreResult<Vec<UserTag>> {
        let tags: Option<Vec<UserTag>> = self
            .client
            .from(USER_TAG_TABLE)
            .select("tag,value")
            .eq("user_id", user_id)
            .is_null("deleted_at")
            .execute()
            .await?;

        Ok(tags.unwrap_or_default())
    }
}
