//! Reconciliation: derive and apply the operations that converge a replica
//! onto its source

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::index::{EntryKind, TreeIndex};
use crate::transport::FileTransport;

/// A single change to the replica, keyed by path relative to the tree roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Path exists only in the source
    Create { path: PathBuf, kind: EntryKind },
    /// Path exists in both trees with different content or kind
    Update { path: PathBuf, kind: EntryKind },
    /// Path exists only in the replica
    Delete { path: PathBuf },
}

impl Operation {
    pub fn path(&self) -> &Path {
        match self {
            Self::Create { path, .. } | Self::Update { path, .. } | Self::Delete { path } => path,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "remove",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Self::Create { .. } => "Created",
            Self::Update { .. } => "Updated",
            Self::Delete { .. } => "Removed",
        }
    }

    fn copies_directory(&self) -> bool {
        matches!(
            self,
            Self::Create { kind: EntryKind::Directory, .. } | Self::Update { kind: EntryKind::Directory, .. }
        )
    }

    fn replaces_replica_path(&self) -> bool {
        matches!(self, Self::Update { .. } | Self::Delete { .. })
    }
}

/// Options controlling how a plan is applied
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Log transport failures and keep going instead of aborting the pass
    pub continue_on_error: bool,
    /// Log the operations without touching the replica
    pub dry_run: bool,
}

/// Outcome counts for one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Operations already satisfied by an earlier recursive copy or delete
    pub covered: usize,
    pub failed: usize,
}

impl TickReport {
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} created, {} updated, {} removed, {} covered, {} failed",
            self.created, self.updated, self.deleted, self.covered, self.failed
        )
    }

    fn record(&mut self, operation: &Operation) {
        match operation {
            Operation::Create { .. } => self.created += 1,
            Operation::Update { .. } => self.updated += 1,
            Operation::Delete { .. } => self.deleted += 1,
        }
    }
}

/// Compute the operations that make `replica` match `source`.
///
/// Replica keys are visited first (Delete or Update), then source keys
/// missing from the replica (Create). Both passes run in path order.
pub fn plan_operations(source: &TreeIndex, replica: &TreeIndex) -> Vec<Operation> {
    let mut operations = Vec::new();

    for (path, replica_entry) in replica {
        match source.get(path) {
            None => operations.push(Operation::Delete { path: path.clone() }),
            Some(source_entry) if source_entry != replica_entry => operations.push(Operation::Update {
                path: path.clone(),
                kind: source_entry.kind,
            }),
            Some(_) => {}
        }
    }

    for (path, source_entry) in source {
        if !replica.contains(path) {
            operations.push(Operation::Create {
                path: path.clone(),
                kind: source_entry.kind,
            });
        }
    }

    operations
}

/// Applies planned operations through a [`FileTransport`]
#[derive(Debug, Clone)]
pub struct Reconciler<T> {
    transport: T,
    options: ReconcileOptions,
}

impl<T: FileTransport> Reconciler<T> {
    pub fn new(transport: T, options: ReconcileOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    pub fn plan(&self, source: &TreeIndex, replica: &TreeIndex) -> Vec<Operation> {
        plan_operations(source, replica)
    }

    /// Plan and apply in one step
    pub async fn reconcile(
        &self,
        source_root: &Path,
        replica_root: &Path,
        source: &TreeIndex,
        replica: &TreeIndex,
    ) -> Result<TickReport> {
        let operations = self.plan(source, replica);
        debug!(
            "Planned {} operations for '{}' -> '{}'",
            operations.len(),
            source_root.display(),
            replica_root.display()
        );
        self.apply(source_root, replica_root, &operations).await
    }

    /// Execute `operations` in order.
    ///
    /// A copy beneath a directory copied earlier in the same pass, or a
    /// delete beneath a path already removed or replaced, is counted as
    /// covered and skipped.
    pub async fn apply(
        &self,
        source_root: &Path,
        replica_root: &Path,
        operations: &[Operation],
    ) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mut copied_dirs: Vec<&Path> = Vec::new();
        let mut replaced: Vec<&Path> = Vec::new();

        for operation in operations {
            let key = operation.path();

            let covered = match operation {
                Operation::Create { .. } | Operation::Update { .. } => {
                    copied_dirs.iter().any(|dir| key.starts_with(dir))
                }
                Operation::Delete { .. } => replaced.iter().any(|path| key.starts_with(path)),
            };

            if covered {
                debug!("Skipping {} of {}: already handled with its parent", operation.verb(), key.display());
                report.covered += 1;
                continue;
            }

            if self.options.dry_run {
                info!(
                    "Would {} {} in replica folder: {}",
                    operation.verb(),
                    key.display(),
                    replica_root.display()
                );
            } else if let Err(e) = self.execute(operation, source_root, replica_root).await {
                error!(
                    "Failed to {} {} in replica folder: {}: {}",
                    operation.verb(),
                    key.display(),
                    replica_root.display(),
                    e
                );

                if !self.options.continue_on_error {
                    return Err(e);
                }

                report.failed += 1;
                continue;
            } else {
                info!(
                    "{} {} in replica folder: {}",
                    operation.past_tense(),
                    key.display(),
                    replica_root.display()
                );
            }

            if operation.copies_directory() {
                copied_dirs.push(key);
            }
            if operation.replaces_replica_path() {
                replaced.push(key);
            }
            report.record(operation);
        }

        Ok(report)
    }

    async fn execute(&self, operation: &Operation, source_root: &Path, replica_root: &Path) -> Result<()> {
        match operation {
            Operation::Create { path, .. } | Operation::Update { path, .. } => {
                self.transport
                    .copy(&source_root.join(path), &replica_root.join(path))
                    .await
            }
            Operation::Delete { path } => self.transport.remove(&replica_root.join(path)).await,
        }
    }
}
