//! PostgREST client error types.

use std::sync::Arc;

use permacache_core::StoreError;

/// PostgREST code for a single-object request that matched zero (or many) rows.
pub const NO_SINGLE_ROW_CODE: &str = "PGRST116";

/// Errors from the PostgREST client.
#[derive(Debug, thiserror::Error)]
pub enum PostgrestError {
    /// No bearer token configured.
    #[error("missing token: PERMACACHE_TOKEN not set")]
    MissingToken,

    /// A configured value cannot be sent as an HTTP header.
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),

    /// Endpoint is not a usable base URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Error response from PostgREST.
    #[error("HTTP {status}: {message}")]
    Api { status: u16, code: Option<String>, message: String, details: Option<String>, hint: Option<String> },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PostgrestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { PostgrestError::Timeout } else { PostgrestError::Network(Arc::new(err)) }
    }
}

impl From<PostgrestError> for StoreError {
    fn from(err: PostgrestError) -> Self {
        match err {
            PostgrestError::Api { status: 409, message, .. } => StoreError::Conflict(message),
            PostgrestError::Api { status: 406, code: Some(code), .. } if code == NO_SINGLE_ROW_CODE => {
                StoreError::NoRows
            }
            PostgrestError::Api { status, code, message, .. } => StoreError::backend(Some(status), code, message),
            other => StoreError::backend(None, None, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: Option<&str>) -> PostgrestError {
        PostgrestError::Api {
            status,
            code: code.map(str::to_string),
            message: "boom".to_string(),
            details: None,
            hint: None,
        }
    }

    #[test]
    fn test_conflict_classification() {
        assert_eq!(StoreError::from(api(409, Some("23505"))), StoreError::Conflict("boom".into()));
    }

    #[test]
    fn test_no_rows_classification() {
        assert_eq!(StoreError::from(api(406, Some("PGRST116"))), StoreError::NoRows);
        assert!(matches!(StoreError::from(api(406, None)), StoreError::Backend { status: Some(406), .. }));
    }

    #[test]
    fn test_other_errors_are_backend() {
        let err = StoreError::from(api(500, Some("XX000")));
        assert_eq!(err, StoreError::backend(Some(500), Some("XX000".into()), "boom"));

        let err = StoreError::from(PostgrestError::Timeout);
        assert!(matches!(err, StoreError::Backend { status: None, .. }));
    }

    #[test]
    fn test_error_display() {
        assert!(PostgrestError::MissingToken.to_string().contains("token"));
        assert_eq!(api(500, None).to_string(), "HTTP 500: boom");
    }
}
