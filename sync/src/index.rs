//! Tree indexing: relative path to fingerprint maps built with walkdir

use std::collections::btree_map::{self, BTreeMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::fingerprint::{ContentFingerprinter, Fingerprint};

/// Kind of filesystem entry recorded in an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// A single index value; directories carry the empty-content fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: EntryKind,
    pub fingerprint: Fingerprint,
}

impl IndexEntry {
    pub fn file(fingerprint: Fingerprint) -> Self {
        Self {
            kind: EntryKind::File,
            fingerprint,
        }
    }

    pub fn directory(fingerprint: Fingerprint) -> Self {
        Self {
            kind: EntryKind::Directory,
            fingerprint,
        }
    }
}

/// Mapping from path (relative to a tree root) to its index entry.
///
/// Keys are ordered component-wise, so a directory always precedes
/// everything beneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndex {
    entries: BTreeMap<PathBuf, IndexEntry>,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(path.into(), entry)
    }

    pub fn insert_file(&mut self, path: impl Into<PathBuf>, fingerprint: Fingerprint) {
        self.insert(path, IndexEntry::file(fingerprint));
    }

    pub fn insert_dir(&mut self, path: impl Into<PathBuf>, empty: Fingerprint) {
        self.insert(path, IndexEntry::directory(empty));
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<IndexEntry> {
        self.entries.remove(path.as_ref())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&IndexEntry> {
        self.entries.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PathBuf, IndexEntry> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }
}

impl<'a> IntoIterator for &'a TreeIndex {
    type Item = (&'a PathBuf, &'a IndexEntry);
    type IntoIter = btree_map::Iter<'a, PathBuf, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Builds a file-only index; handy for planning against fixed digests
impl<P: Into<PathBuf>> FromIterator<(P, Fingerprint)> for TreeIndex {
    fn from_iter<I: IntoIterator<Item = (P, Fingerprint)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (path, fingerprint) in iter {
            index.insert_file(path, fingerprint);
        }
        index
    }
}

/// Walks a directory tree and fingerprints every entry beneath the root
#[derive(Debug, Clone, Default)]
pub struct TreeIndexer {
    fingerprinter: ContentFingerprinter,
}

impl TreeIndexer {
    pub fn new(fingerprinter: ContentFingerprinter) -> Self {
        Self { fingerprinter }
    }

    pub fn fingerprinter(&self) -> &ContentFingerprinter {
        &self.fingerprinter
    }

    /// Index every file and subdirectory reachable from `root`.
    ///
    /// Symbolic links are followed, so the index describes the
    /// dereferenced tree.
    pub async fn index<P: AsRef<Path>>(&self, root: P) -> Result<TreeIndex> {
        let root = root.as_ref();

        if !root.exists() {
            return Err(SyncError::path_error(root, "Directory does not exist"));
        }

        if !root.is_dir() {
            return Err(SyncError::path_error(root, "Path is not a directory"));
        }

        let walker = WalkDir::new(root).min_depth(1).follow_links(true);
        let empty = self.fingerprinter.empty();
        let mut index = TreeIndex::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(ErrorKind::NotFound) => {
                    tracing::debug!("Skipping entry that vanished during walk of '{}': {}", root.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(SyncError::scan_error(root, format!("Walk error: {}", e)));
                }
            };

            let relative_path = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| {
                    SyncError::path_error(entry.path(), format!("Failed to create relative path: {}", e))
                })?
                .to_path_buf();

            if entry.file_type().is_dir() {
                index.insert_dir(relative_path, empty.clone());
            } else {
                let fingerprint = self.fingerprinter.fingerprint_file(entry.path()).await?;
                index.insert_file(relative_path, fingerprint);
            }
        }

        tracing::trace!("Indexed {} entries under '{}'", index.len(), root.display());
        Ok(index)
    }
}
