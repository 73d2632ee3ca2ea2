use std::path::PathBuf;

/// Core error type for the relay.
///
/// Adapter crates map their library-specific errors into this type so the
/// orchestration layer can handle failures consistently (abort-now vs
/// ready-to-retry). Per-recipient send failures are deliberately NOT a
/// variant here: they are captured into the batch result and never unwind
/// a delivery loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("missing credentials: {0}")]
    CredentialsMissing(&'static str),

    #[error("a phone number is required for login")]
    PhoneRequired,

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("no document id found in link: {0}")]
    InvalidDocumentLink(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("nothing to send: neither text nor attachment present")]
    EmptyPayload,

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
