//! Perma-cache access layer.
//!
//! [`Ledger`] owns one repository per schema and exposes the seven ledger
//! operations. Every call is a single round trip to the store; no state is
//! kept between calls, so a ledger can be shared freely across tasks.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{Error, HTTP_STATUS_CONFLICT};
use crate::model::{
    DEFAULT_PAGE_SIZE, DeletedEntry, ListOptions, NewPermaCacheEntry, PermaCacheEntry, PermaCacheItem, User,
    UserTags,
};
use crate::store::{PermaCacheRepo, StoreError, UserRepo};

/// Access layer over the perma-cache and user schemas.
#[derive(Debug, Clone)]
pub struct Ledger<P, U> {
    perma_cache: P,
    users: U,
    default_page_size: u32,
}

impl<P: PermaCacheRepo, U: UserRepo> Ledger<P, U> {
    pub fn new(perma_cache: P, users: U) -> Self {
        Self { perma_cache, users, default_page_size: DEFAULT_PAGE_SIZE }
    }

    /// Page size used by [`Ledger::list_perma_cache`] when the caller gives none.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        if size > 0 {
            self.default_page_size = size;
        }
        self
    }

    pub fn perma_cache_repo(&self) -> &P {
        &self.perma_cache
    }

    pub fn user_repo(&self) -> &U {
        &self.users
    }

    /// Pin a URL for a user.
    ///
    /// Fails with a constraint error (status 409) while an active entry for
    /// the same URL exists.
    pub async fn create_perma_cache(
        &self, user_id: i64, url: &str, size: u64, inserted_at: DateTime<Utc>,
    ) -> Result<PermaCacheEntry, Error> {
        let entry = NewPermaCacheEntry { user_id, url: url.to_string(), size, inserted_at };
        tracing::debug!(user_id, url, size, "creating perma-cache entry");

        match self.perma_cache.insert_entry(&entry).await {
            Ok(Some(created)) => Ok(created),
            Ok(None) => Err(Error::NotCreated),
            Err(StoreError::Conflict(_)) => Err(Error::Constraint {
                message: "URL already found for user".to_string(),
                status: Some(HTTP_STATUS_CONFLICT),
            }),
            Err(e) => Err(Error::Database(e)),
        }
    }

    /// The active entry for `(user_id, url)`, if any.
    pub async fn get_perma_cache(&self, user_id: i64, url: &str) -> Result<Option<PermaCacheItem>, Error> {
        match self.perma_cache.find_active_entry(user_id, url).await {
            Ok(item) => Ok(item),
            Err(StoreError::NoRows) => Ok(None),
            Err(e) => Err(Error::Database(e)),
        }
    }

    /// One page of the user's active entries.
    ///
    /// The `before` cursor always applies to `inserted_at`, also when sorting
    /// by size.
    pub async fn list_perma_cache(&self, user_id: i64, opts: &ListOptions) -> Result<Vec<PermaCacheItem>, Error> {
        let limit = opts.page_size(self.default_page_size);
        tracing::debug!(
            user_id,
            limit,
            sort_by = ?opts.sort_by,
            sort_order = ?opts.sort_order,
            before = ?opts.before,
            "listing perma-cache entries"
        );

        Ok(self.perma_cache.list_active_entries(user_id, opts, limit).await?)
    }

    /// Tombstone the active entry for `(user_id, url)`.
    ///
    /// Returns `None` when nothing active matched.
    pub async fn delete_perma_cache(&self, user_id: i64, url: &str) -> Result<Option<DeletedEntry>, Error> {
        let ids = self
            .perma_cache
            .tombstone_active_entry(user_id, url, Utc::now())
            .await?;

        if ids.len() > 1 {
            tracing::warn!(user_id, url, count = ids.len(), "tombstoned more than one active perma-cache entry");
        }

        Ok(ids.first().map(|&id| DeletedEntry { id }))
    }

    /// Bytes used by the user's active entries.
    pub async fn used_perma_cache_storage(&self, user_id: i64) -> Result<u64, Error> {
        Ok(self.perma_cache.used_storage(user_id).await?.unwrap_or(0))
    }

    /// Look up a user by magic link id, GitHub id or DID.
    ///
    /// An identity that resolves to more than one user is rejected rather
    /// than resolved to an arbitrary one of them.
    pub async fn get_user(&self, identity: &str) -> Result<Option<User>, Error> {
        let mut users = match self.users.find_users_by_identity(identity, 2).await {
            Ok(users) => users,
            Err(StoreError::NoRows) => return Ok(None),
            Err(e) => return Err(Error::Database(e)),
        };

        if users.len() > 1 {
            tracing::warn!(identity, "identity matches more than one user");
            return Err(Error::constraint(format!("identity {identity} matches more than one user")));
        }

        Ok(users.pop())
    }

    /// Active tags of a user.
    ///
    /// Tag names are expected to be unique among active rows but the store
    /// does not enforce it. A duplicate means corrupt data and is reported as
    /// a constraint error instead of being returned.
    pub async fn get_user_tags(&self, user_id: i64) -> Result<UserTags, Error> {
        let tags = self.users.active_user_tags(user_id).await?;

        let mut seen = HashSet::with_capacity(tags.len());
        for item in &tags {
            if !seen.insert(item.tag.as_str()) {
                tracing::warn!(user_id, tag = %item.tag, "duplicate active user tag");
                return Err(Error::constraint(format!("More than one row found for user tag {}", item.tag)));
            }
        }

        Ok(UserTags::new(tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SortBy, SortOrder, UserTag, UserTagName};
    use crate::sqlite::{NewUser, SqliteStore};
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    async fn ledger() -> Ledger<SqliteStore, SqliteStore> {
        let store = SqliteStore::open_in_memory().await.unwrap();
        Ledger::new(store.clone(), store)
    }

    #[tokio::test]
    async fn test_create_conflict_then_recreate_after_delete() {
        let ledger = ledger().await;

        let first = ledger.create_perma_cache(1, "https://a.test/x", 100, t(0)).await.unwrap();
        assert_eq!(first.user_id, 1);
        assert_eq!(first.size, 100);
        assert!(first.deleted_at.is_none());

        let err = ledger.create_perma_cache(1, "https://a.test/x", 100, t(1)).await.unwrap_err();
        assert!(matches!(err, Error::Constraint { status: Some(409), .. }));
        assert!(err.to_string().contains("URL already found for user"));

        let deleted = ledger.delete_perma_cache(1, "https://a.test/x").await.unwrap();
        assert_eq!(deleted, Some(DeletedEntry { id: first.id }));

        let second = ledger.create_perma_cache(1, "https://a.test/x", 200, t(2)).await.unwrap();
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_same_url_for_different_users() {
        let ledger = ledger().await;
        ledger.create_perma_cache(1, "https://a.test/x", 1, t(0)).await.unwrap();
        ledger.create_perma_cache(2, "https://a.test/x", 1, t(0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_twice_is_noop() {
        let ledger = ledger().await;
        ledger.create_perma_cache(1, "https://a.test/x", 10, t(0)).await.unwrap();

        assert!(ledger.delete_perma_cache(1, "https://a.test/x").await.unwrap().is_some());
        assert!(ledger.delete_perma_cache(1, "https://a.test/x").await.unwrap().is_none());
        assert_eq!(ledger.perma_cache_repo().count_tombstoned(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_sorting() {
        let ledger = ledger().await;
        ledger.create_perma_cache(1, "https://a.test/1", 300, t(10)).await.unwrap();
        ledger.create_perma_cache(1, "https://a.test/2", 100, t(30)).await.unwrap();
        ledger.create_perma_cache(1, "https://a.test/3", 200, t(20)).await.unwrap();

        let by_date = ledger
            .list_perma_cache(1, &ListOptions { sort_by: SortBy::Date, sort_order: SortOrder::Asc, ..Default::default() })
            .await
            .unwrap();
        let dates: Vec<_> = by_date.iter().map(|i| i.inserted_at).collect();
        assert_eq!(dates, vec![t(10), t(20), t(30)]);

        let by_size = ledger
            .list_perma_cache(1, &ListOptions { sort_by: SortBy::Size, sort_order: SortOrder::Desc, ..Default::default() })
            .await
            .unwrap();
        let sizes: Vec<_> = by_size.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![300, 200, 100]);

        let default = ledger.list_perma_cache(1, &ListOptions::default()).await.unwrap();
        assert_eq!(default[0].url, "https://a.test/2");
    }

    #[tokio::test]
    async fn test_list_before_cursor() {
        let ledger = ledger().await;
        ledger.create_perma_cache(1, "https://a.test/1", 1, t(1)).await.unwrap();
        ledger.create_perma_cache(1, "https://a.test/2", 2, t(2)).await.unwrap();
        ledger.create_perma_cache(1, "https://a.test/3", 3, t(3)).await.unwrap();

        let page = ledger
            .list_perma_cache(1, &ListOptions { before: Some(t(3)), ..Default::default() })
            .await
            .unwrap();
        let urls: Vec<_> = page.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.test/2", "https://a.test/1"]);
    }

    #[tokio::test]
    async fn test_list_page_size() {
        let ledger = ledger().await.with_default_page_size(2);
        for i in 0..5 {
            ledger.create_perma_cache(1, &format!("https://a.test/{i}"), 1, t(i)).await.unwrap();
        }

        assert_eq!(ledger.list_perma_cache(1, &ListOptions::default()).await.unwrap().len(), 2);
        let page = ledger
            .list_perma_cache(1, &ListOptions { size: Some(4), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.len(), 4);
    }

    #[tokio::test]
    async fn test_soft_deleted_entries_are_invisible() {
        let ledger = ledger().await;
        ledger.create_perma_cache(1, "https://a.test/keep", 100, t(0)).await.unwrap();
        ledger.create_perma_cache(1, "https://a.test/drop", 50, t(1)).await.unwrap();
        assert_eq!(ledger.used_perma_cache_storage(1).await.unwrap(), 150);

        ledger.delete_perma_cache(1, "https://a.test/drop").await.unwrap();

        assert!(ledger.get_perma_cache(1, "https://a.test/drop").await.unwrap().is_none());
        let listed = ledger.list_perma_cache(1, &ListOptions::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].url, "https://a.test/keep");
        assert_eq!(ledger.used_perma_cache_storage(1).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_absent_and_empty() {
        let ledger = ledger().await;
        assert!(ledger.get_perma_cache(7, "https://nowhere.test").await.unwrap().is_none());
        assert!(ledger.list_perma_cache(7, &ListOptions::default()).await.unwrap().is_empty());
        assert!(ledger.delete_perma_cache(7, "https://nowhere.test").await.unwrap().is_none());
        assert_eq!(ledger.used_perma_cache_storage(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_returns_projection() {
        let ledger = ledger().await;
        ledger.create_perma_cache(1, "https://a.test/x", 42, t(5)).await.unwrap();

        let item = ledger.get_perma_cache(1, "https://a.test/x").await.unwrap().unwrap();
        assert_eq!(item, PermaCacheItem { url: "https://a.test/x".into(), size: 42, inserted_at: t(5) });
    }

    #[tokio::test]
    async fn test_tag_duplicate_detected_and_recovered() {
        let ledger = ledger().await;
        let store = ledger.user_repo();
        let user_id = store.insert_user(&NewUser { did: Some("did:key:z6Mk".into()), ..Default::default() }).await.unwrap();

        let first = store.insert_user_tag(user_id, "HasSuperHotAccess", "true").await.unwrap();
        store.insert_user_tag(user_id, "HasSuperHotAccess", "false").await.unwrap();

        let err = ledger.get_user_tags(user_id).await.unwrap_err();
        assert!(matches!(err, Error::Constraint { status: None, .. }));
        assert!(err.to_string().contains("More than one row found for user tag HasSuperHotAccess"));

        store.delete_user_tag(first, Utc::now()).await.unwrap();

        let tags = ledger.get_user_tags(user_id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert!(!tags.is_enabled(UserTagName::HasSuperHotAccess));
        assert_eq!(tags.into_vec(), vec![UserTag { tag: "HasSuperHotAccess".into(), value: "false".into() }]);
    }

    #[tokio::test]
    async fn test_get_user_by_did_only() {
        let ledger = ledger().await;
        let store = ledger.user_repo();
        let user_id = store
            .insert_user(&NewUser { did: Some("did:key:z6MkAlice".into()), ..Default::default() })
            .await
            .unwrap();
        store.insert_auth_key(user_id, "default", "s3cr3t").await.unwrap();
        let revoked = store.insert_auth_key(user_id, "old", "0ld").await.unwrap();
        store.delete_auth_key(revoked, Utc::now()).await.unwrap();
        store.insert_user_tag(user_id, "HasAccountRestriction", "false").await.unwrap();

        let user = ledger.get_user("did:key:z6MkAlice").await.unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert!(user.github_id.is_none());
        assert_eq!(user.keys.len(), 1);
        assert_eq!(user.keys[0].name, "default");
        assert_eq!(user.tags.len(), 1);

        assert!(ledger.get_user("did:key:unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_user_by_github_and_magic_link() {
        let ledger = ledger().await;
        let store = ledger.user_repo();
        let user_id = store
            .insert_user(&NewUser {
                magic_link_id: Some("did:ethr:0xabc".into()),
                github_id: Some("github|123".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(ledger.get_user("github|123").await.unwrap().unwrap().id, user_id);
        assert_eq!(ledger.get_user("did:ethr:0xabc").await.unwrap().unwrap().id, user_id);
    }

    #[tokio::test]
    async fn test_get_user_ambiguous_identity() {
        let ledger = ledger().await;
        let store = ledger.user_repo();
        store.insert_user(&NewUser { github_id: Some("shared".into()), ..Default::default() }).await.unwrap();
        store.insert_user(&NewUser { did: Some("shared".into()), ..Default::default() }).await.unwrap();

        let err = ledger.get_user("shared").await.unwrap_err();
        assert!(matches!(err, Error::Constraint { .. }));
    }

    /// Repository that answers every call with a fixed outcome.
    struct Scripted {
        insert: StoreResult<Option<PermaCacheEntry>>,
        failure: StoreError,
    }

    #[async_trait]
    impl PermaCacheRepo for Scripted {
        async fn insert_entry(&self, _entry: &NewPermaCacheEntry) -> StoreResult<Option<PermaCacheEntry>> {
            self.insert.clone()
        }

        async fn find_active_entry(&self, _user_id: i64, _url: &str) -> StoreResult<Option<PermaCacheItem>> {
            Err(self.failure.clone())
        }

        async fn list_active_entries(
            &self, _user_id: i64, _opts: &ListOptions, _limit: u32,
        ) -> StoreResult<Vec<PermaCacheItem>> {
            Err(self.failure.clone())
        }

        async fn tombstone_active_entry(
            &self, _user_id: i64, _url: &str, _at: DateTime<Utc>,
        ) -> StoreResult<Vec<i64>> {
            Err(self.failure.clone())
        }

        async fn used_storage(&self, _user_id: i64) -> StoreResult<Option<u64>> {
            Err(self.failure.clone())
        }
    }

    #[async_trait]
    impl UserRepo for Scripted {
        async fn find_users_by_identity(&self, _identity: &str, _limit: u32) -> StoreResult<Vec<User>> {
            Err(self.failure.clone())
        }

        async fn active_user_tags(&self, _user_id: i64) -> StoreResult<Vec<UserTag>> {
            Err(self.failure.clone())
        }
    }

    fn scripted(insert: StoreResult<Option<PermaCacheEntry>>, failure: StoreError) -> Ledger<Scripted, Scripted> {
        let users = Scripted { insert: Ok(None), failure: failure.clone() };
        Ledger::new(Scripted { insert, failure }, users)
    }

    #[tokio::test]
    async fn test_insert_without_row_is_not_created() {
        let ledger = scripted(Ok(None), StoreError::NoRows);
        let err = ledger.create_perma_cache(1, "https://a.test", 1, t(0)).await.unwrap_err();
        assert!(matches!(err, Error::NotCreated));
    }

    #[tokio::test]
    async fn test_backend_errors_surface_as_database() {
        let failure = StoreError::backend(Some(500), Some("XX000".into()), "internal");
        let ledger = scripted(Err(failure.clone()), failure);

        let err = ledger.create_perma_cache(1, "https://a.test", 1, t(0)).await.unwrap_err();
        assert!(matches!(err, Error::Database(StoreError::Backend { status: Some(500), .. })));

        assert!(matches!(ledger.get_perma_cache(1, "https://a.test").await, Err(Error::Database(_))));
        assert!(matches!(ledger.list_perma_cache(1, &ListOptions::default()).await, Err(Error::Database(_))));
        assert!(matches!(ledger.delete_perma_cache(1, "https://a.test").await, Err(Error::Database(_))));
        assert!(matches!(ledger.used_perma_cache_storage(1).await, Err(Error::Database(_))));
        assert!(matches!(ledger.get_user("did:key:x").await, Err(Error::Database(_))));
        assert!(matches!(ledger.get_user_tags(1).await, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_no_rows_signal_means_absent() {
        let ledger = scripted(Ok(None), StoreError::NoRows);
        assert!(ledger.get_perma_cache(1, "https://a.test").await.unwrap().is_none());
        assert!(ledger.get_user("did:key:x").await.unwrap().is_none());
    }
}
