//! PostgREST response decoding.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::PostgrestError;

/// Error body PostgREST sends with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Build an error from a failed response.
///
/// Bodies that are not PostgREST error objects are kept verbatim as the
/// message.
pub fn api_error(status: u16, body: &[u8]) -> PostgrestError {
    let parsed: ApiErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    PostgrestError::Api { status, code: parsed.code, message, details: parsed.details, hint: parsed.hint }
}

/// Decode a successful response body.
///
/// An empty body or a JSON `null` means the store returned no data.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, PostgrestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(body).map_err(|e| PostgrestError::Parse(e.to_string()))
}
