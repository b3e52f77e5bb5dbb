//! Filesystem mutation: the only place the replica tree is changed

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;

use filetime::FileTime;
use tokio::fs;
use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Copy and remove operations the reconciler depends on
pub trait FileTransport {
    /// Copy `source` to `destination`, replacing what is there.
    ///
    /// Directories are copied recursively and must not land on an
    /// existing directory.
    fn copy(&self, source: &Path, destination: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Remove `path`; a missing path is not an error.
    fn remove(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Transport backed by the local filesystem via tokio::fs
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::copy_error(source, destination, format!("Failed to create parent directory: {}", e))
            })?;
        }

        fs::copy(source, destination).await.map_err(|e| {
            SyncError::copy_error(source, destination, format!("Failed to copy file: {}", e))
        })?;
        let metadata = fs::metadata(source).await.map_err(|e| {
            SyncError::copy_error(source, destination, format!("Failed to read source metadata: {}", e))
        })?;

        preserve_times(&metadata, source, destination)
    }

    async fn copy_tree(&self, source: &Path, destination: &Path) -> Result<()> {
        fs::create_dir_all(destination).await.map_err(|e| {
            SyncError::copy_error(source, destination, format!("Failed to create directory: {}", e))
        })?;

        for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => continue,
                Err(e) => {
                    return Err(SyncError::copy_error(source, destination, format!("Walk error: {}", e)));
                }
            };

            let relative = entry.path().strip_prefix(source).map_err(|e| {
                SyncError::copy_error(source, destination, format!("Failed to create relative path: {}", e))
            })?;
            let target = destination.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).await.map_err(|e| {
                    SyncError::copy_error(entry.path(), &target, format!("Failed to create directory: {}", e))
                })?;
            } else {
                fs::copy(entry.path(), &target).await.map_err(|e| {
                    SyncError::copy_error(entry.path(), &target, format!("Failed to copy file: {}", e))
                })?;
                let metadata = entry.metadata().map_err(|e| {
                    SyncError::copy_error(entry.path(), &target, format!("Failed to read source metadata: {}", e))
                })?;
                preserve_times(&metadata, entry.path(), &target)?;
            }
        }

        Ok(())
    }
}

/// Carry access and modification times over to a freshly copied file
fn preserve_times(metadata: &std::fs::Metadata, source: &Path, destination: &Path) -> Result<()> {
    let atime = FileTime::from_last_access_time(metadata);
    let mtime = FileTime::from_last_modification_time(metadata);

    filetime::set_file_times(destination, atime, mtime).map_err(|e| {
        SyncError::copy_error(source, destination, format!("Failed to set file times: {}", e))
    })
}

impl FileTransport for LocalTransport {
    async fn copy(&self, source: &Path, destination: &Path) -> Result<()> {
        let source_metadata = fs::metadata(source).await.map_err(|e| {
            SyncError::copy_error(source, destination, format!("Failed to read source metadata: {}", e))
        })?;

        let existing = match fs::symlink_metadata(destination).await {
            Ok(metadata) => Some(metadata),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return Err(SyncError::copy_error(
                    source,
                    destination,
                    format!("Failed to read destination metadata: {}", e),
                ));
            }
        };

        // Never write through a link: it may point back into the source
        let existing = match existing {
            Some(metadata) if metadata.file_type().is_symlink() => {
                tracing::debug!("Unlinking symlink '{}' before copy", destination.display());
                self.remove(destination).await?;
                None
            }
            other => other,
        };

        if source_metadata.is_dir() {
            if let Some(existing) = existing {
                if existing.is_dir() {
                    return Err(SyncError::conflict_error(
                        destination,
                        "Refusing to copy a directory into an existing directory",
                    ));
                }
                tracing::debug!("Replacing file '{}' with a directory", destination.display());
                self.remove(destination).await?;
            }
            self.copy_tree(source, destination).await
        } else {
            if existing.is_some_and(|m| m.is_dir()) {
                tracing::debug!("Replacing directory '{}' with a file", destination.display());
                self.remove(destination).await?;
            }
            self.copy_file(source, destination).await
        }
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(SyncError::deletion_error(path, format!("Failed to read metadata: {}", e)));
            }
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::deletion_error(path, format!("Failed to delete: {}", e))),
        }
    }
}
