//! Embedded SQLite implementation of the ledger repositories.
//!
//! Mirrors the remote schema closely enough to exercise the ledger locally:
//!
//! - Partial unique index keeping one active perma-cache row per user and URL
//! - Versioned schema migrations
//! - WAL mode for concurrent access
//! - No uniqueness on user tag names, as in the remote user schema

pub mod connection;
pub mod migrations;
pub mod perma_cache;
pub mod users;

pub use connection::SqliteStore;
pub use users::NewUser;

use chrono::{DateTime, Utc};
use tokio_rusqlite::rusqlite;
use tokio_rusqlite::rusqlite::types::Type;

use crate::store::StoreError;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NoRows,
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            e => StoreError::backend(None, None, e.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error<StoreError>> for StoreError {
    fn from(err: tokio_rusqlite::Error<StoreError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::Close((_, e)) => e.into(),
            _ => StoreError::backend(None, None, "connection closed"),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StoreError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e.into(),
            tokio_rusqlite::Error::Close((_, e)) => e.into(),
            _ => StoreError::backend(None, None, "connection closed"),
        }
    }
}

/// Read a timestamp column written by [`crate::model::format_timestamp`].
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_optional_timestamp(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_timestamp(idx, &r)).transpose()
}

/// Sizes are stored as SQLite integers (i64).
pub(crate) fn parse_size(idx: usize, raw: i64) -> rusqlite::Result<u64> {
    u64::try_from(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_maps_to_no_rows() {
        assert_eq!(StoreError::from(rusqlite::Error::QueryReturnedNoRows), StoreError::NoRows);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp(0, "yesterday").is_err());
        assert!(parse_timestamp(0, "2024-01-01T00:00:00.000000Z").is_ok());
    }

    #[test]
    fn test_parse_size_rejects_negative() {
        assert!(parse_size(0, -1).is_err());
        assert_eq!(parse_size(0, 512).unwrap(), 512);
    }
}
