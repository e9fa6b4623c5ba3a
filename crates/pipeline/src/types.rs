//! Job and event types for the publishing pipeline.

use std::fmt;
use std::path::PathBuf;

/// Credentials for the remote services.
///
/// Held by the pipeline for the lifetime of the process, never persisted.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// File host account login.
    pub login: String,
    /// File host account password.
    pub password: String,
    /// Image host API key.
    pub api_key: String,
}

/// The caller-facing pipeline actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Packaging input files into an archive.
    Package,
    /// Publishing the cover image.
    Cover,
    /// Uploading the archive to the file host.
    Upload,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Package => "package",
            ActionKind::Cover => "cover",
            ActionKind::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Progress report emitted while an action runs.
///
/// Events are informational; the action's return value is the single
/// authoritative result.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The action reached a new stage.
    Progress { action: ActionKind, status: String },

    /// The action finished; `output` is the produced path or URL.
    Completed { action: ActionKind, output: String },

    /// The action failed.
    Failed { action: ActionKind, error: String },
}

/// Lifecycle of one file-host upload.
///
/// States only move forward within an attempt; polling repeats in place
/// until the host reports a terminal result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JobState {
    #[default]
    NotStarted,
    Archived,
    Authenticated,
    Negotiated,
    Transferring,
    Polling,
    Completed(String),
    Failed(String),
}

/// One file-host upload, tracked across packaging and upload actions.
#[derive(Debug, Clone, Default)]
pub struct UploadJob {
    /// Input files; fixed once packaging starts.
    pub file_paths: Vec<PathBuf>,
    /// Set once the archiver has produced the bundle.
    pub archive_path: Option<PathBuf>,
    /// Hex MD5 of the uploaded bytes; computed lazily, once per archive.
    pub content_digest: Option<String>,
    /// Remote upload id; present only when a transfer was required.
    pub upload_id: Option<String>,
    pub state: JobState,
}

/// Lifecycle of one cover publish. A single round trip, so there are no
/// intermediate states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageState {
    #[default]
    NotStarted,
    Completed(String),
    Failed(String),
}

/// One cover-image publish.
#[derive(Debug, Clone, Default)]
pub struct ImageJob {
    pub source: PathBuf,
    pub state: ImageState,
}
