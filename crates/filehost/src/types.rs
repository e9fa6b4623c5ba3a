//! Wire and configuration types for the file host client.

use std::time::Duration;

use serde::Deserialize;

use crate::DEFAULT_POLL_INTERVAL;

/// Outcome of an upload negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The host already stores this content; no transfer needed.
    AlreadyExists { url: String },
    /// The host expects the bytes at `url`, tracked as `upload_id`.
    TransferRequired { upload_id: String, url: String },
}

/// Outcome of a single status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Remote processing finished; the file is served at `url`.
    Done { url: String },
    /// Still processing; ask again later.
    Pending,
}

/// Optional form fields for the transfer request.
///
/// The negotiated URL normally carries the upload identity in its query
/// string; some endpoint variants expect these as form fields instead.
#[derive(Debug, Clone, Default)]
pub struct TransferFields {
    pub token: Option<String>,
    pub name: Option<String>,
    pub hash: Option<String>,
    pub size: Option<u64>,
}

/// Controls the status poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up (`None` = poll until done).
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Envelope wrapping every file host response.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub response: Option<T>,
    pub status: Option<i64>,
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub upload: Option<UploadInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadInfo {
    pub state: Option<i64>,
    pub upload_id: Option<String>,
    pub url: Option<String>,
    pub file: Option<RemoteFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RemoteFile {
    pub url: Option<String>,
}

/// Receipt returned by the transfer endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TransferReceipt {
    pub status: Option<i64>,
}
