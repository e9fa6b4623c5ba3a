//! Pipeline error types.

use relpost_archive::ArchiveError;
use relpost_filehost::FileHostError;

/// Errors surfaced by pipeline actions.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("image host error: {0}")]
    ImageHost(#[from] relpost_imagehost::Error),

    #[error("file host error: {0}")]
    FileHost(FileHostError),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("cancelled")]
    Cancelled,
}

// Cancellation keeps its own variant so callers can tell an abandoned
// upload from a protocol failure.
impl From<FileHostError> for PipelineError {
    fn from(e: FileHostError) -> Self {
        match e {
            FileHostError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::FileHost(other),
        }
    }
}
