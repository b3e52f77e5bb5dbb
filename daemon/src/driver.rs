use anyhow::{Context, Result};
use replica_sync::{ensure_replica_root, MirrorEngine, TickReport};
use std::future::Future;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::MirrorConfig;

/// Drives mirror ticks at a fixed interval until shutdown
pub struct MirrorDriver {
    config: MirrorConfig,
    engine: MirrorEngine,
}

impl MirrorDriver {
    pub fn new(config: MirrorConfig) -> Self {
        let engine = MirrorEngine::new(config.options.clone());
        Self { config, engine }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Create the replica root before the first tick
    pub async fn bootstrap(&self) -> Result<()> {
        ensure_replica_root(&self.config.replica)
            .await
            .with_context(|| format!("Failed to prepare replica folder {}", self.config.replica.display()))?;
        Ok(())
    }

    pub async fn tick(&self) -> Result<TickReport> {
        let report = self.engine.tick(&self.config.source, &self.config.replica).await?;
        Ok(report)
    }

    /// Tick forever (or once), stopping cleanly on Ctrl-C
    pub async fn run(&self, once: bool) -> Result<()> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C, only a tick error will stop the loop: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(once, shutdown).await
    }

    /// Tick until `shutdown` resolves during the sleep between ticks
    pub async fn run_until<F>(&self, once: bool, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Mirroring {} into {} every {:?}",
            self.config.source.display(),
            self.config.replica.display(),
            self.config.interval
        );
        if self.config.options.dry_run {
            info!("Dry run: the replica will not be modified");
        }

        tokio::pin!(shutdown);
        let mut ticks: u64 = 0;

        loop {
            ticks += 1;
            if let Err(e) = self.tick().await {
                error!("Tick {} failed: {:#}", ticks, e);
                return Err(e.context(format!("Sync tick {} failed", ticks)));
            }

            if once {
                info!("Single tick complete, exiting");
                return Ok(());
            }

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping after {} ticks", ticks);
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_sync::MirrorOptions;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(root: &Path, interval: Duration) -> MirrorConfig {
        MirrorConfig {
            source: root.join("source"),
            replica: root.join("replica"),
            log_path: root.join("sync.log"),
            interval,
            log_level: "info".to_string(),
            options: MirrorOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_single_tick_mirrors_and_exits() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), Duration::from_secs(3600));
        std::fs::create_dir_all(config.source.join("docs")).unwrap();
        std::fs::write(config.source.join("docs/readme.txt"), b"hello").unwrap();

        let driver = MirrorDriver::new(config);
        driver.bootstrap().await.unwrap();
        driver.run(true).await.unwrap();

        let copied = std::fs::read(driver.config().replica.join("docs/readme.txt")).unwrap();
        assert_eq!(copied, b"hello");
    }

    #[tokio::test]
    async fn test_shutdown_between_ticks() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), Duration::from_millis(10));
        std::fs::create_dir_all(&config.source).unwrap();
        std::fs::write(config.source.join("a.txt"), b"a").unwrap();

        let driver = MirrorDriver::new(config);
        driver.bootstrap().await.unwrap();
        driver
            .run_until(false, sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(driver.config().replica.join("a.txt").is_file());
    }

    #[tokio::test]
    async fn test_tick_failure_stops_the_loop() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), Duration::from_millis(10));
        std::fs::create_dir_all(&config.source).unwrap();

        let driver = MirrorDriver::new(config);
        driver.bootstrap().await.unwrap();
        std::fs::remove_dir_all(&driver.config().source).unwrap();

        let result = driver.run_until(false, std::future::pending()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_file_replica() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), Duration::from_secs(1));
        std::fs::write(&config.replica, b"in the way").unwrap();

        let driver = MirrorDriver::new(config);

        assert!(driver.bootstrap().await.is_err());
    }
}
