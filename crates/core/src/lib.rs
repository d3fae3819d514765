//! Core types and access layer for the perma-cache ledger.
//!
//! This crate provides:
//! - The [`Ledger`] access layer and its domain error taxonomy
//! - Repository traits describing what a backing store must support
//! - An embedded SQLite implementation of those repositories
//! - Layered configuration

pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod sqlite;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use ledger::Ledger;
pub use model::{
    DeletedEntry, ListOptions, PermaCacheEntry, PermaCacheItem, SortBy, SortOrder, User, UserKey, UserTag,
    UserTagName, UserTagRecord, UserTags,
};
pub use sqlite::SqliteStore;
pub use store::{PermaCacheRepo, StoreError, StoreResult, UserRepo};
