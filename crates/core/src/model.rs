//! Ledger record types.
//!
//! Field names follow the store's underscore-separated columns, except where
//! a query aliases them (the `insertedAt:inserted_at` projection).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A perma-cache row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermaCacheEntry {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub size: u64,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields supplied when pinning a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermaCacheEntry {
    pub user_id: i64,
    pub url: String,
    pub size: u64,
    pub inserted_at: DateTime<Utc>,
}

/// Projection returned by lookups and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermaCacheItem {
    pub url: String,
    pub size: u64,
    pub inserted_at: DateTime<Utc>,
}

/// Identifier of a tombstoned entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEntry {
    pub id: i64,
}

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    Date,
    Size,
}

impl SortBy {
    /// Store column backing this sort key.
    pub fn column(self) -> &'static str {
        match self {
            SortBy::Date => "inserted_at",
            SortBy::Size => "size",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

impl SortOrder {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortOrder::Asc)
    }
}

/// Listing options.
///
/// `before` is a cursor on `inserted_at` whatever `sort_by` says.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Page limit; `None` or zero falls back to the ledger default.
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl ListOptions {
    /// Effective page size.
    pub fn page_size(&self, default: u32) -> u32 {
        self.size.filter(|&s| s > 0).unwrap_or(default)
    }
}

/// API key attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    pub user_id: i64,
    pub id: i64,
    pub name: String,
    pub secret: String,
}

/// Tag row attached to a user by [`User`] lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTagRecord {
    pub user_id: i64,
    pub id: i64,
    pub tag: String,
    pub value: String,
}

/// A user with its active keys and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub github_id: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub keys: Vec<UserKey>,
    #[serde(default)]
    pub tags: Vec<UserTagRecord>,
}

/// `{tag, value}` pair returned by tag reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTag {
    pub tag: String,
    pub value: String,
}

/// Tag names the gateway acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserTagName {
    HasAccountRestriction,
    HasSuperHotAccess,
}

impl UserTagName {
    pub fn as_str(self) -> &'static str {
        match self {
            UserTagName::HasAccountRestriction => "HasAccountRestriction",
            UserTagName::HasSuperHotAccess => "HasSuperHotAccess",
        }
    }
}

/// Active tags of one user, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserTags(Vec<UserTag>);

impl UserTags {
    /// Callers must have checked name uniqueness.
    pub(crate) fn new(tags: Vec<UserTag>) -> Self {
        Self(tags)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|t| t.tag == name).map(|t| t.value.as_str())
    }

    /// A tag is enabled when present with the value `true`.
    pub fn is_enabled(&self, name: UserTagName) -> bool {
        self.get(name.as_str()) == Some("true")
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserTag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<UserTag> {
        self.0
    }
}

/// Fixed-width RFC 3339 form, so text comparison matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_uses_inserted_at_alias() {
        let json = r#"{"url": "https://example.com/a", "size": 42, "insertedAt": "2024-01-01T00:00:00Z"}"#;
        let item: PermaCacheItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.size, 42);
        assert_eq!(item.inserted_at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let out = serde_json::to_value(&item).unwrap();
        assert!(out.get("insertedAt").is_some());
        assert!(out.get("inserted_at").is_none());
    }

    #[test]
    fn test_list_options_defaults() {
        let opts = ListOptions::default();
        assert_eq!(opts.page_size(DEFAULT_PAGE_SIZE), 10);
        assert_eq!(opts.sort_by, SortBy::Date);
        assert_eq!(opts.sort_order, SortOrder::Desc);
        assert!(opts.before.is_none());

        let zero = ListOptions { size: Some(0), ..Default::default() };
        assert_eq!(zero.page_size(DEFAULT_PAGE_SIZE), 10);

        let custom = ListOptions { size: Some(3), ..Default::default() };
        assert_eq!(custom.page_size(DEFAULT_PAGE_SIZE), 3);
    }

    #[test]
    fn test_sort_enums_wire_names() {
        let opts: ListOptions = serde_json::from_str(r#"{"sort_by": "Size", "sort_order": "Asc"}"#).unwrap();
        assert_eq!(opts.sort_by.column(), "size");
        assert!(opts.sort_order.is_ascending());
    }

    #[test]
    fn test_user_tags_enabled() {
        let tags = UserTags::new(vec![
            UserTag { tag: "HasSuperHotAccess".into(), value: "true".into() },
            UserTag { tag: "HasAccountRestriction".into(), value: "false".into() },
        ]);
        assert!(tags.is_enabled(UserTagName::HasSuperHotAccess));
        assert!(!tags.is_enabled(UserTagName::HasAccountRestriction));
        assert_eq!(tags.get("HasAccountRestriction"), Some("false"));
        assert_eq!(tags.get("Missing"), None);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = format_timestamp(&Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let b = format_timestamp(&Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap());
        assert_eq!(a, "2024-01-01T00:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
