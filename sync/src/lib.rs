//! Replica Sync Library
//!
//! Keeps a replica directory identical to a source directory by comparing
//! content fingerprints and applying the minimal set of changes:
//! - Content fingerprinting (Blake3 or SHA-256)
//! - Recursive tree indexing keyed by relative path
//! - Two-pass reconciliation into create/update/delete operations
//! - A pluggable file transport that performs the copies and deletes

pub mod fingerprint;
pub mod index;
pub mod reconcile;
pub mod transport;
pub mod engine;
pub mod error;

// Re-export main types and functions
pub use fingerprint::{ContentFingerprinter, Fingerprint, HashAlgorithm};
pub use index::{EntryKind, IndexEntry, TreeIndex, TreeIndexer};
pub use reconcile::{plan_operations, Operation, ReconcileOptions, Reconciler, TickReport};
pub use transport::{FileTransport, LocalTransport};
pub use engine::{ensure_replica_root, MirrorEngine, MirrorOptions};
pub use error::{SyncError, Result};

/// Index a directory tree with the given hash algorithm
pub async fn index_tree(
    path: impl AsRef<std::path::Path>,
    algorithm: HashAlgorithm,
) -> Result<TreeIndex> {
    let indexer = TreeIndexer::new(ContentFingerprinter::new(algorithm));
    indexer.index(path).await
}

/// Run a single mirror pass from `source` onto `replica`
pub async fn mirror_once(
    source: impl AsRef<std::path::Path>,
    replica: impl AsRef<std::path::Path>,
    options: MirrorOptions,
) -> Result<TickReport> {
    let engine = MirrorEngine::new(options);
    engine.tick(source, replica).await
}

#[cfg(test)]
mod integration_tests;
