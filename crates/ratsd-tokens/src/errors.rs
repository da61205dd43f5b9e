//! Error types for ratsd evidence tokens

use thiserror::Error;

/// Token encoding, decoding and validation errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("missing mandatory field {0:?}")]
    MissingField(&'static str),

    #[error("stray field {0:?}")]
    StrayField(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR encoding error: {0}")]
    CborEncode(String),

    #[error("CBOR decoding error: {0}")]
    CborDecode(String),

    #[error("duplicate collection label {0:?}")]
    DuplicateLabel(String),

    #[error("invalid CMW: {0}")]
    InvalidCmw(String),
}

/// Result type for token operations
pub type Result<T> = std::result::Result<T, TokenError>;
