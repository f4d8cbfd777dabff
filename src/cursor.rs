//! # Run Listing Cursors
//!
//! Opaque URL-safe base64 cursors for the keyset-paginated run listing. Decoding
//! validates size, alphabet, encoding and shape before the cursor reaches a
//! query.

use axum::http::StatusCode;
use base64::Engine;

use crate::error::ApiError;
use crate::workflow::RunCursor;

const MAX_CURSOR_LEN: usize = 512;
const MAX_DECODED_LEN: usize = 256;

fn invalid(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
}

/// Encodes the position after `cursor` as an opaque string
pub fn encode_cursor(cursor: &RunCursor) -> Result<String, ApiError> {
    let json = serde_json::to_vec(cursor).map_err(|err| {
        tracing::error!(error = %err, "Failed to encode run cursor");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "failed to encode cursor",
        )
    })?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a cursor produced by [`encode_cursor`]
pub fn decode_cursor(cursor: &str) -> Result<RunCursor, ApiError> {
    if cursor.is_empty() {
        return Err(invalid("cursor cannot be empty"));
    }

    if cursor.len() > MAX_CURSOR_LEN {
        return Err(invalid("cursor is too long"));
    }

    if !cursor
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid("cursor contains invalid characters"));
    }

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| invalid("cursor is not valid base64"))?;

    if decoded.len() > MAX_DECODED_LEN {
        return Err(invalid("decoded cursor is too large"));
    }

    let json = String::from_utf8(decoded).map_err(|_| invalid("cursor contains invalid UTF-8 data"))?;

    let cursor: RunCursor =
        serde_json::from_str(&json).map_err(|_| invalid("cursor contains invalid JSON structure"))?;

    if cursor.id.is_nil() {
        return Err(invalid("cursor contains invalid ID"));
    }

    Ok(cursor)
}
