//! Transport decoding and attachment persistence.
//!
//! Mail APIs deliver bodies and attachments in URL-safe Base64. The decoding
//! itself lives in `billdigest_mime::encoding`; this module adds the
//! run-scoped attachment directory the extractor writes decoded PDFs into.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use uuid::Uuid;

pub use billdigest_mime::encoding::{decode_transport, decode_transport_text, encode_transport};

/// The shared directory decoded attachments are written to during a run.
#[derive(Debug)]
pub struct AttachmentStore {
    directory: PathBuf,
    used: AtomicBool,
}

impl AttachmentStore {
    /// Creates a store rooted at `directory`. Nothing is created on disk yet.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            used: AtomicBool::new(false),
        }
    }

    /// Directory attachments are written to.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns true once a write into the directory has been attempted.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    /// Generates a run-unique file name of the form `<uuid>.pdf`.
    #[must_use]
    pub fn new_file_name() -> String {
        format!("{}.pdf", Uuid::new_v4())
    }

    /// Writes `bytes` to `file_name` inside the directory, creating the
    /// directory first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub async fn persist(&self, bytes: &[u8], file_name: &str) -> io::Result<PathBuf> {
        self.used.store(true, Ordering::Release);
        tokio::fs::create_dir_all(&self.directory).await?;

        let path = self.directory.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Saved attachment");

        Ok(path)
    }

    /// Removes every file in the directory and returns how many were removed.
    ///
    /// A missing directory counts as already clean. Individual removal
    /// failures are logged and skipped; this never fails.
    pub async fn cleanup(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.directory.display(), error = %e, "Cannot read attachment directory");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.directory.display(), error = %e, "Stopped listing attachment directory");
                    break;
                }
            };

            let path = entry.path();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if !is_file {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove attachment"),
            }
        }

        debug!(dir = %self.directory.display(), removed, "Cleaned attachment directory");
        removed
    }
}
