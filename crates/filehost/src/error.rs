//! File host error types.

/// Errors produced by the file host client.
#[derive(Debug, thiserror::Error)]
pub enum FileHostError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("login rejected: {0}")]
    InvalidCredentials(String),

    #[error("response missing field: {0}")]
    MissingField(&'static str),

    #[error("unexpected upload state: {0}")]
    UnexpectedState(i64),

    #[error("upload finished without a download URL")]
    MissingDownloadUrl,

    #[error("transfer rejected with status {0}")]
    Rejected(i64),

    #[error("gave up after {0} status polls")]
    Exhausted(u32),

    #[error("cancelled")]
    Cancelled,
}
