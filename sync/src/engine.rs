//! One full mirror tick: index both trees, then reconcile

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::fingerprint::{ContentFingerprinter, HashAlgorithm};
use crate::index::TreeIndexer;
use crate::reconcile::{ReconcileOptions, Reconciler, TickReport};
use crate::transport::{FileTransport, LocalTransport};

/// Options for a mirror engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorOptions {
    /// Digest used to fingerprint file content
    pub hash_algorithm: HashAlgorithm,
    /// Read buffer size for hashing
    pub buffer_size: usize,
    /// Continue on transport errors instead of aborting the tick
    pub continue_on_error: bool,
    /// Log planned operations without modifying the replica
    pub dry_run: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            buffer_size: 64 * 1024, // 64KB
            continue_on_error: false,
            dry_run: false,
        }
    }
}

impl MirrorOptions {
    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            continue_on_error: self.continue_on_error,
            dry_run: self.dry_run,
        }
    }
}

/// Runs index-compare-apply passes from a source tree onto a replica tree
pub struct MirrorEngine<T = LocalTransport> {
    options: MirrorOptions,
    indexer: TreeIndexer,
    reconciler: Reconciler<T>,
}

impl MirrorEngine<LocalTransport> {
    /// Create an engine that mutates the local filesystem
    pub fn new(options: MirrorOptions) -> Self {
        Self::with_transport(options, LocalTransport::new())
    }
}

impl<T: FileTransport> MirrorEngine<T> {
    /// Create an engine with a custom transport
    pub fn with_transport(options: MirrorOptions, transport: T) -> Self {
        let fingerprinter = ContentFingerprinter::with_buffer_size(options.hash_algorithm, options.buffer_size);
        let indexer = TreeIndexer::new(fingerprinter);
        let reconciler = Reconciler::new(transport, options.reconcile_options());

        Self {
            options,
            indexer,
            reconciler,
        }
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn indexer(&self) -> &TreeIndexer {
        &self.indexer
    }

    pub fn reconciler(&self) -> &Reconciler<T> {
        &self.reconciler
    }

    /// Run one tick: index both trees and converge the replica
    pub async fn tick<P1: AsRef<Path>, P2: AsRef<Path>>(&self, source: P1, replica: P2) -> Result<TickReport> {
        let source_path = source.as_ref();
        let replica_path = replica.as_ref();
        let start_time = Instant::now();

        let source_index = self.indexer.index(source_path).await?;
        let replica_index = self.indexer.index(replica_path).await?;
        debug!(
            "Indexed {} source entries and {} replica entries",
            source_index.len(),
            replica_index.len()
        );

        let report = self
            .reconciler
            .reconcile(source_path, replica_path, &source_index, &replica_index)
            .await?;

        if report.total_changes() > 0 || report.failed > 0 {
            info!("Tick finished in {:?}: {}", start_time.elapsed(), report.summary());
        } else {
            debug!("Tick finished in {:?}: replica already up to date", start_time.elapsed());
        }

        Ok(report)
    }
}

/// Create the replica root if it is missing.
///
/// Returns `true` when the directory had to be created.
pub async fn ensure_replica_root<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();

    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => return Ok(false),
        Ok(_) => {
            return Err(SyncError::path_error(path, "Replica path exists but is not a directory"));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(SyncError::path_error(path, format!("Failed to read metadata: {}", e)));
        }
    }

    fs::create_dir_all(path).await.map_err(|e| {
        SyncError::path_error(path, format!("Failed to create replica directory: {}", e))
    })?;
    info!("Created replica folder: {}", path.display());

    Ok(true)
}
