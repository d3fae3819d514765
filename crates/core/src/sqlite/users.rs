//! User schema repository over SQLite, plus the writes needed to seed it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::SqliteStore;
use crate::model::{User, UserKey, UserTag, UserTagRecord, format_timestamp};
use crate::store::{StoreError, StoreResult, UserRepo};

/// Identifiers for a new user; any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub magic_link_id: Option<String>,
    pub github_id: Option<String>,
    pub did: Option<String>,
}

fn active_keys(conn: &rusqlite::Connection, user_id: i64) -> rusqlite::Result<Vec<UserKey>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, id, name, secret FROM auth_key
         WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(UserKey { user_id: row.get(0)?, id: row.get(1)?, name: row.get(2)?, secret: row.get(3)? })
    })?;
    rows.collect()
}

fn active_tag_records(conn: &rusqlite::Connection, user_id: i64) -> rusqlite::Result<Vec<UserTagRecord>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, id, tag, value FROM user_tag
         WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(UserTagRecord { user_id: row.get(0)?, id: row.get(1)?, tag: row.get(2)?, value: row.get(3)? })
    })?;
    rows.collect()
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn find_users_by_identity(&self, identity: &str, limit: u32) -> StoreResult<Vec<User>> {
        let identity = identity.to_string();
        self.conn
            .call(move |conn| -> StoreResult<Vec<User>> {
                let mut users = {
                    let mut stmt = conn.prepare(
                        "SELECT id, github_id, did FROM \"user\"
                         WHERE magic_link_id = ?1 OR github_id = ?1 OR did = ?1
                         ORDER BY id LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![identity, limit], |row| {
                        Ok(User {
                            id: row.get(0)?,
                            github_id: row.get(1)?,
                            did: row.get(2)?,
                            keys: Vec::new(),
                            tags: Vec::new(),
                        })
                    })?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                };

                for user in &mut users {
                    user.keys = active_keys(conn, user.id)?;
                    user.tags = active_tag_records(conn, user.id)?;
                }
                Ok(users)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn active_user_tags(&self, user_id: i64) -> StoreResult<Vec<UserTag>> {
        self.conn
            .call(move |conn| -> StoreResult<Vec<UserTag>> {
                let mut stmt = conn.prepare(
                    "SELECT tag, value FROM user_tag
                     WHERE user_id = ?1 AND deleted_at IS NULL ORDER BY id",
                )?;
                let tags = stmt
                    .query_map(params![user_id], |row| Ok(UserTag { tag: row.get(0)?, value: row.get(1)? }))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tags)
            })
            .await
            .map_err(StoreError::from)
    }
}

impl SqliteStore {
    /// Insert a user and return its id.
    pub async fn insert_user(&self, user: &NewUser) -> StoreResult<i64> {
        let user = user.clone();
        let now = format_timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> StoreResult<i64> {
                conn.execute(
                    "INSERT INTO \"user\" (magic_link_id, github_id, did, inserted_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![user.magic_link_id, user.github_id, user.did, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Attach an API key to a user and return the key id.
    pub async fn insert_auth_key(&self, user_id: i64, name: &str, secret: &str) -> StoreResult<i64> {
        let (name, secret) = (name.to_string(), secret.to_string());
        let now = format_timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> StoreResult<i64> {
                conn.execute(
                    "INSERT INTO auth_key (user_id, name, secret, inserted_at) VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, name, secret, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Tombstone an API key. Returns false if it was not active.
    pub async fn delete_auth_key(&self, key_id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        self.tombstone("auth_key", key_id, at).await
    }

    /// Attach a tag to a user and return the tag row id.
    ///
    /// Does not check for an existing active tag with the same name.
    pub async fn insert_user_tag(&self, user_id: i64, tag: &str, value: &str) -> StoreResult<i64> {
        let (tag, value) = (tag.to_string(), value.to_string());
        let now = format_timestamp(&Utc::now());
        self.conn
            .call(move |conn| -> StoreResult<i64> {
                conn.execute(
                    "INSERT INTO user_tag (user_id, tag, value, inserted_at) VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, tag, value, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Tombstone a user tag. Returns false if it was not active.
    pub async fn delete_user_tag(&self, tag_id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        self.tombstone("user_tag", tag_id, at).await
    }

    async fn tombstone(&self, table: &'static str, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let sql = format!("UPDATE {table} SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL");
        let at = format_timestamp(&at);
        self.conn
            .call(move |conn| -> StoreResult<bool> { Ok(conn.execute(&sql, params![id, at])? == 1) })
            .await
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_attaches_only_active_children() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let id = store
            .insert_user(&NewUser { github_id: Some("github|42".into()), ..Default::default() })
            .await
            .unwrap();
        store.insert_auth_key(id, "ci", "abc").await.unwrap();
        let tag = store.insert_user_tag(id, "HasSuperHotAccess", "true").await.unwrap();
        assert!(store.delete_user_tag(tag, Utc::now()).await.unwrap());
        assert!(!store.delete_user_tag(tag, Utc::now()).await.unwrap());

        let users = store.find_users_by_identity("github|42", 2).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].github_id.as_deref(), Some("github|42"));
        assert_eq!(users[0].keys.len(), 1);
        assert!(users[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_identity_column_conflicts() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let user = NewUser { did: Some("did:key:z6Mk".into()), ..Default::default() };
        store.insert_user(&user).await.unwrap();

        let err = store.insert_user(&user).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_tags_for_unknown_user_are_empty() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert!(store.active_user_tags(99).await.unwrap().is_empty());
    }
}
