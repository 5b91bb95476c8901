//! Wire marshalling for values that cross the process boundary.
//!
//! Requests travel to the worker through its argv; return values travel back
//! inside a `set-return-value` control line. Both use compact JSON: it is
//! self-describing, stable across two executions of the same binary, and its
//! output contains neither NUL nor raw newlines, so a marshalled value is
//! always safe inside the control framing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from marshalling values to or from wire text.
#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("failed to encode value for the wire: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode value from the wire: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Marshal a value into wire text.
pub fn to_wire<T: Serialize>(value: &T) -> Result<String, MarshalError> {
    serde_json::to_string(value).map_err(MarshalError::Encode)
}

/// Unmarshal a value from wire text.
pub fn from_wire<T: DeserializeOwned>(wire: &str) -> Result<T, MarshalError> {
    serde_json::from_str(wire).map_err(MarshalError::Decode)
}

// ============================================================================
// Tests
// ============================================================================
