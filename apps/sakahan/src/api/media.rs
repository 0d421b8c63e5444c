//! # Media Store
//!
//! Attachment blobs on disk, addressed by the relative paths the engine
//! records. Writes happen before the owning transaction commits; removals
//! after it.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative blob path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write a blob, creating parent directories.
    pub async fn save(&self, relative: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.resolve(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await
    }

    /// Remove blobs, logging failures. A missing blob is not an error.
    pub async fn remove_all<'a>(&self, relatives: impl IntoIterator<Item = &'a str>) {
        for relative in relatives {
            match tokio::fs::remove_file(self.resolve(relative)).await {
                Ok(()) => tracing::debug!(path = relative, "removed attachment blob"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = relative, error = %err, "failed to remove attachment blob");
                }
            }
        }
    }
}
