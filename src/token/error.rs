use thiserror::Error;

/// Reasons a presented token is rejected before touching persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    MalformedToken,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    ExpiredToken,
    #[error("token scope mismatch")]
    ScopeMismatch,
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid subject id")]
    InvalidSubject,
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("invalid ttl: {ttl_seconds}s (allowed 1..={max_seconds}s)")]
    InvalidTtl { ttl_seconds: i64, max_seconds: i64 },
    #[error("signing key rejected")]
    Key,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
}
