//! Flat zip packaging with deterministic, digest-derived archive names.
//!
//! A bundle of input files becomes a single `.zip` in the scratch
//! directory. Entries keep only their base file names, and the archive is
//! named after a salted digest of the longest input stem, so the same
//! bundle always lands at the same path.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use relpost_digest::salted_md5_hex;

/// Fixed salt prepended to the archive label before hashing.
const NAME_SALT: &str = "stevejobs";

/// Errors produced while packaging files.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("no input files")]
    EmptyInput,

    #[error("input file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to place archive: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Packages file bundles into flat zip archives.
#[derive(Debug, Clone)]
pub struct Archiver {
    scratch_dir: PathBuf,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl Archiver {
    /// Creates an archiver that writes archives into `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Returns the archive path `paths` would produce, without building it.
    ///
    /// The name is a pure function of the longest input stem, so it can be
    /// computed up front and is stable across runs.
    pub fn archive_path(&self, paths: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
        let label = archive_label(paths).ok_or(ArchiveError::EmptyInput)?;
        let name = format!("{}.zip", salted_md5_hex(NAME_SALT, &label));
        Ok(self.scratch_dir.join(name))
    }

    /// Packages `paths` into a single flat zip archive.
    ///
    /// The archive is written to a uniquely named temp file and renamed
    /// into place, so an existing archive with the same derived name is
    /// replaced whole and concurrent runs never observe a partial file.
    /// If any input is missing, nothing is left at the target path.
    pub fn archive(&self, paths: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
        let target = self.archive_path(paths)?;

        let tmp = tempfile::NamedTempFile::new_in(&self.scratch_dir)?;
        let mut writer = ZipWriter::new(tmp);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for path in paths {
            let entry_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ArchiveError::FileNotFound(path.clone()))?;
            let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ArchiveError::FileNotFound(path.clone()),
                _ => ArchiveError::Io(e),
            })?;

            writer.start_file(entry_name, options)?;
            io::copy(&mut file, &mut writer)?;
        }

        let tmp = writer.finish()?;
        tmp.persist(&target)?;

        debug!(archive = %target.display(), files = paths.len(), "archive written");
        Ok(target)
    }
}

/// Returns the longest file stem among `paths` (first one wins on ties).
///
/// This is the label the archive name is derived from; it also serves as a
/// human-readable title for the published bundle.
pub fn archive_label(paths: &[PathBuf]) -> Option<String> {
    let mut label: Option<String> = None;
    for path in paths {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        match &label {
            Some(current) if stem.chars().count() <= current.chars().count() => {}
            _ => label = Some(stem),
        }
    }
    label
}
