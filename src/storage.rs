//! Database files on disk: upload validation, per-session placement,
//! the bundled default database and download naming.

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StorageSettings;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("File size exceeds {limit_mb}MB limit")]
    TooLarge { limit_mb: usize },

    #[error("Only {allowed} files are allowed")]
    DisallowedExtension { allowed: String },

    #[error("Default database not found at {0}")]
    DefaultMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Where session databases live and what may be stored there.
#[derive(Debug, Clone)]
pub struct FileStore {
    settings: StorageSettings,
}

impl FileStore {
    pub fn new(settings: StorageSettings) -> Self {
        Self { settings }
    }

    /// Database file for a session. Session ids are server-generated UUIDs.
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.settings.upload_dir.join(format!("{}.db", session_id))
    }

    /// Check the declared filename before any bytes are read.
    pub fn check_filename(&self, filename: &str) -> Result<(), UploadError> {
        let extension = filename
            .rfind('.')
            .map(|idx| filename[idx..].to_lowercase())
            .unwrap_or_default();
        let allowed = &self.settings.allowed_extensions;
        if allowed.iter().any(|ext| ext.to_lowercase() == extension) {
            Ok(())
        } else {
            Err(UploadError::DisallowedExtension {
                allowed: allowed.join(", "),
            })
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.settings.max_upload_bytes {
            Err(UploadError::TooLarge {
                limit_mb: self.settings.max_upload_bytes / (1024 * 1024),
            })
        } else {
            Ok(())
        }
    }

    /// Upload staging file for a session, kept apart from its live database.
    pub fn staging_path(&self, session_id: &str) -> PathBuf {
        self.settings.upload_dir.join(format!("{}.db.upload", session_id))
    }

    /// Write an uploaded database to the session's staging file. The live
    /// database is untouched until [`FileStore::promote_upload`].
    pub fn stage_upload(&self, session_id: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
        self.check_size(bytes.len())?;
        let path = self.staging_path(session_id);
        write_atomically(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "staged uploaded database");
        Ok(path)
    }

    /// Replace the session's live database with its staged upload.
    pub fn promote_upload(&self, session_id: &str) -> Result<PathBuf, UploadError> {
        let staged = self.staging_path(session_id);
        let path = self.session_path(session_id);
        fs::rename(&staged, &path)?;
        info!(path = %path.display(), "stored uploaded database");
        Ok(path)
    }

    /// Copy the bundled default database into the session's slot.
    pub fn copy_default(&self, session_id: &str) -> Result<PathBuf, UploadError> {
        let source = &self.settings.default_db_path;
        let bytes = fs::read(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => UploadError::DefaultMissing(source.clone()),
            _ => UploadError::Io(e),
        })?;
        let path = self.session_path(session_id);
        write_atomically(&path, &bytes)?;
        info!(source = %source.display(), path = %path.display(), "copied default database");
        Ok(path)
    }
}

// A half-written file must never be visible under the final name.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("db.part");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// `database_YYYY-MM-DD_HH-MM-SS.db`
pub fn download_filename(now: DateTime<Local>) -> String {
    format!("database_{}.db", now.format("%Y-%m-%d_%H-%M-%S"))
}
