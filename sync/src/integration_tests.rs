//! End-to-end mirror passes over real temporary directory trees

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;

use crate::engine::{ensure_replica_root, MirrorEngine, MirrorOptions};
use crate::error::SyncError;
use crate::fingerprint::HashAlgorithm;
use crate::index::TreeIndex;

/// Source and replica roots inside one temporary directory
struct Trees {
    _temp_dir: TempDir,
    source: PathBuf,
    replica: PathBuf,
}

impl Trees {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");
        fs::create_dir_all(&source).await.unwrap();
        fs::create_dir_all(&replica).await.unwrap();

        Self {
            _temp_dir: temp_dir,
            source,
            replica,
        }
    }

    async fn write_source(&self, relative: &str, content: &[u8]) {
        write(&self.source, relative, content).await;
    }

    async fn write_replica(&self, relative: &str, content: &[u8]) {
        write(&self.replica, relative, content).await;
    }

    async fn indices(&self, engine: &MirrorEngine) -> (TreeIndex, TreeIndex) {
        let source = engine.indexer().index(&self.source).await.unwrap();
        let replica = engine.indexer().index(&self.replica).await.unwrap();
        (source, replica)
    }
}

async fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.unwrap();
    }
    fs::write(path, content).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_first_pass_copies_everything() {
    let trees = Trees::new().await;
    trees.write_source("top.txt", b"top").await;
    trees.write_source("a/b/c/deep.txt", b"deep").await;
    trees.write_source("a/side.txt", b"side").await;
    fs::create_dir_all(trees.source.join("empty/dir")).await.unwrap();

    let engine = MirrorEngine::new(MirrorOptions::default());
    let report = engine.tick(&trees.source, &trees.replica).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(fs::read(trees.replica.join("a/b/c/deep.txt")).await.unwrap(), b"deep");
    assert!(trees.replica.join("empty/dir").is_dir());

    let (source, replica) = trees.indices(&engine).await;
    assert_eq!(source, replica);
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let trees = Trees::new().await;
    trees.write_source("one.txt", b"1").await;
    trees.write_source("nested/two.txt", b"2").await;
    trees.write_replica("stale.txt", b"old").await;

    let engine = MirrorEngine::new(MirrorOptions::default());
    let first = engine.tick(&trees.source, &trees.replica).await.unwrap();
    let second = engine.tick(&trees.source, &trees.replica).await.unwrap();

    assert!(first.total_changes() > 0);
    assert_eq!(second.total_changes(), 0);
    assert_eq!(second.covered, 0);
}

#[tokio::test]
async fn test_changes_between_ticks_are_mirrored() {
    let trees = Trees::new().await;
    trees.write_source("keep.txt", b"keep").await;
    trees.write_source("edit.txt", b"before").await;
    trees.write_source("drop/inner.txt", b"inner").await;

    let engine = MirrorEngine::new(MirrorOptions::default());
    engine.tick(&trees.source, &trees.replica).await.unwrap();

    trees.write_source("edit.txt", b"after").await;
    fs::remove_dir_all(trees.source.join("drop")).await.unwrap();
    trees.write_source("added/new.txt", b"new").await;

    let report = engine.tick(&trees.source, &trees.replica).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.created, 1);
    assert_eq!(fs::read(trees.replica.join("edit.txt")).await.unwrap(), b"after");
    assert!(!trees.replica.join("drop").exists());
    assert_eq!(fs::read(trees.replica.join("added/new.txt")).await.unwrap(), b"new");

    let (source, replica) = trees.indices(&engine).await;
    assert_eq!(source, replica);
}

#[tokio::test]
async fn test_file_and_directory_swap_places() {
    let trees = Trees::new().await;
    trees.write_source("was_file/child.txt", b"child").await;
    trees.write_source("was_dir", b"").await;
    trees.write_replica("was_file", b"flat").await;
    trees.write_replica("was_dir/leftover.txt", b"leftover").await;

    let engine = MirrorEngine::new(MirrorOptions::default());
    let report = engine.tick(&trees.source, &trees.replica).await.unwrap();

    assert_eq!(report.updated, 2);
    assert!(trees.replica.join("was_file").is_dir());
    assert!(trees.replica.join("was_dir").is_file());

    let (source, replica) = trees.indices(&engine).await;
    assert_eq!(source, replica);
}

#[tokio::test]
async fn test_source_is_never_modified() {
    let trees = Trees::new().await;
    trees.write_source("s.txt", b"source side").await;
    trees.write_replica("r.txt", b"replica side").await;
    trees.write_replica("s.txt", b"diverged").await;

    let engine = MirrorEngine::new(MirrorOptions {
        hash_algorithm: HashAlgorithm::Sha256,
        ..Default::default()
    });
    let before = engine.indexer().index(&trees.source).await.unwrap();
    engine.tick(&trees.source, &trees.replica).await.unwrap();
    let after = engine.indexer().index(&trees.source).await.unwrap();

    assert_eq!(before, after);
    assert!(!trees.source.join("r.txt").exists());
}

#[tokio::test]
async fn test_dry_run_leaves_replica_untouched() {
    let trees = Trees::new().await;
    trees.write_source("new.txt", b"new").await;
    trees.write_replica("old.txt", b"old").await;

    let engine = MirrorEngine::new(MirrorOptions {
        dry_run: true,
        ..Default::default()
    });
    let report = engine.tick(&trees.source, &trees.replica).await.unwrap();

    assert_eq!((report.created, report.deleted), (1, 1));
    assert!(!trees.replica.join("new.txt").exists());
    assert!(trees.replica.join("old.txt").exists());
}

#[tokio::test]
async fn test_bootstrap_then_tick() {
    let trees = Trees::new().await;
    trees.write_source("f.txt", b"f").await;
    let fresh_replica = trees.replica.join("fresh");

    assert!(ensure_replica_root(&fresh_replica).await.unwrap());
    let report = crate::mirror_once(&trees.source, &fresh_replica, MirrorOptions::default())
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(fs::read(fresh_replica.join("f.txt")).await.unwrap(), b"f");
}

#[tokio::test]
async fn test_missing_replica_root_fails_tick() {
    let trees = Trees::new().await;

    let engine = MirrorEngine::new(MirrorOptions::default());
    let result = engine.tick(&trees.source, trees.replica.join("absent")).await;

    assert!(matches!(result, Err(SyncError::Path { .. })));
}

#[tokio::test]
async fn test_index_tree_matches_engine_indexer() {
    let trees = Trees::new().await;
    trees.write_source("x/y.txt", b"y").await;

    let engine = MirrorEngine::new(MirrorOptions {
        hash_algorithm: HashAlgorithm::Sha256,
        ..Default::default()
    });
    let expected = engine.indexer().index(&trees.source).await.unwrap();
    let index = crate::index_tree(&trees.source, HashAlgorithm::Sha256).await.unwrap();

    assert_eq!(index, expected);
    assert_eq!(index.len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_replica_symlink_into_source_is_replaced() {
    let trees = Trees::new().await;
    trees.write_source("f", b"NEW").await;
    trees.write_source("g", b"precious").await;
    std::os::unix::fs::symlink(trees.source.join("g"), trees.replica.join("f")).unwrap();

    crate::mirror_once(&trees.source, &trees.replica, MirrorOptions::default())
        .await
        .unwrap();

    assert_eq!(fs::read(trees.source.join("g")).await.unwrap(), b"precious");
    assert_eq!(fs::read(trees.replica.join("f")).await.unwrap(), b"NEW");
    assert_eq!(fs::read(trees.replica.join("g")).await.unwrap(), b"precious");
}
