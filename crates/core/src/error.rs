//! Domain error taxonomy for the perma-cache ledger.
//!
//! Repositories report [`StoreError`]; the ledger is the only place that
//! turns those into the [`Error`] kinds its callers see.

use crate::store::StoreError;

/// HTTP status reported alongside a uniqueness conflict on create.
pub const HTTP_STATUS_CONFLICT: u16 = 409;

/// Errors surfaced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store-reported failure that has no more specific meaning.
    #[error("DB_ERROR: {0}")]
    Database(#[source] StoreError),

    /// A domain invariant was violated, either on write (duplicate active URL)
    /// or detected on read (duplicate active tag, ambiguous identity).
    #[error("CONSTRAINT_ERROR: {message}")]
    Constraint { message: String, status: Option<u16> },

    /// The store acknowledged an insert but returned no row.
    #[error("NOT_CREATED: write acknowledged but no row returned")]
    NotCreated,
}

impl Error {
    pub(crate) fn constraint(message: impl Into<String>) -> Self {
        Error::Constraint { message: message.into(), status: None }
    }

    /// Status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Constraint { status, .. } => *status,
            Error::Database(StoreError::Backend { status, .. }) => *status,
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Database(err)
    }
}
