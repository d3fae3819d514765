//! Perma-cache repository over SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::SqliteStore;
use super::{parse_optional_timestamp, parse_size, parse_timestamp};
use crate::model::{ListOptions, NewPermaCacheEntry, PermaCacheEntry, PermaCacheItem, format_timestamp};
use crate::store::{PermaCacheRepo, StoreError, StoreResult};

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermaCacheEntry> {
    Ok(PermaCacheEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        size: parse_size(3, row.get(3)?)?,
        inserted_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
        updated_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        deleted_at: parse_optional_timestamp(6, row.get(6)?)?,
    })
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermaCacheItem> {
    Ok(PermaCacheItem {
        url: row.get(0)?,
        size: parse_size(1, row.get(1)?)?,
        inserted_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
    })
}

#[async_trait]
impl PermaCacheRepo for SqliteStore {
    async fn insert_entry(&self, entry: &NewPermaCacheEntry) -> StoreResult<Option<PermaCacheEntry>> {
        let size = i64::try_from(entry.size)
            .map_err(|_| StoreError::backend(None, None, format!("size {} out of range", entry.size)))?;
        let user_id = entry.user_id;
        let url = entry.url.clone();
        let inserted_at = format_timestamp(&entry.inserted_at);
        let now = format_timestamp(&Utc::now());

        self.conn
            .call(move |conn| -> StoreResult<Option<PermaCacheEntry>> {
                conn.execute(
                    "INSERT INTO perma_cache (user_id, url, size, inserted_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![user_id, url, size, inserted_at, now],
                )?;
                let id = conn.last_insert_rowid();

                let created = conn
                    .query_row(
                        "SELECT id, user_id, url, size, inserted_at, updated_at, deleted_at
                         FROM perma_cache WHERE id = ?1",
                        params![id],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(created)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn find_active_entry(&self, user_id: i64, url: &str) -> StoreResult<Option<PermaCacheItem>> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> StoreResult<Option<PermaCacheItem>> {
                let item = conn
                    .query_row(
                        "SELECT url, size, inserted_at FROM perma_cache
                         WHERE user_id = ?1 AND url = ?2 AND deleted_at IS NULL",
                        params![user_id, url],
                        item_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn list_active_entries(
        &self, user_id: i64, opts: &ListOptions, limit: u32,
    ) -> StoreResult<Vec<PermaCacheItem>> {
        let direction = if opts.sort_order.is_ascending() { "ASC" } else { "DESC" };
        // Column and direction come from closed enums, never from caller text.
        let sql = format!(
            "SELECT url, size, inserted_at FROM perma_cache
             WHERE user_id = ?1 AND deleted_at IS NULL
               AND (?3 IS NULL OR inserted_at < ?3)
             ORDER BY {column} {direction}, id {direction}
             LIMIT ?2",
            column = opts.sort_by.column(),
        );
        let before = opts.before.as_ref().map(format_timestamp);

        self.conn
            .call(move |conn| -> StoreResult<Vec<PermaCacheItem>> {
                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map(params![user_id, limit, before], item_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn tombstone_active_entry(&self, user_id: i64, url: &str, at: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        let url = url.to_string();
        let at = format_timestamp(&at);
        self.conn
            .call(move |conn| -> StoreResult<Vec<i64>> {
                let tx = conn.transaction()?;
                let ids = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM perma_cache
                         WHERE user_id = ?1 AND url = ?2 AND deleted_at IS NULL",
                    )?;
                    let rows = stmt.query_map(params![user_id, url], |row| row.get::<_, i64>(0))?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                };
                for id in &ids {
                    tx.execute(
                        "UPDATE perma_cache SET deleted_at = ?2, updated_at = ?2
                         WHERE id = ?1 AND deleted_at IS NULL",
                        params![id, at],
                    )?;
                }
                tx.commit()?;
                Ok(ids)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn used_storage(&self, user_id: i64) -> StoreResult<Option<u64>> {
        self.conn
            .call(move |conn| -> StoreResult<Option<u64>> {
                let total: Option<i64> = conn.query_row(
                    "SELECT SUM(size) FROM perma_cache WHERE user_id = ?1 AND deleted_at IS NULL",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(total.map(|t| parse_size(0, t)).transpose()?)
            })
            .await
            .map_err(StoreError::from)
    }
}

impl SqliteStore {
    /// Number of tombstoned entries a user has accumulated.
    pub async fn count_tombstoned(&self, user_id: i64) -> StoreResult<u64> {
        self.conn
            .call(move |conn| -> StoreResult<u64> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM perma_cache WHERE user_id = ?1 AND deleted_at IS NOT NULL",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(parse_size(0, count)?)
            })
            .await
            .map_err(StoreError::from)
    }
}
