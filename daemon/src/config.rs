use anyhow::{bail, Context, Result};
use replica_sync::{HashAlgorithm, MirrorOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings from one layer (command line or TOML file); every field optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub source_path: Option<PathBuf>,
    pub replica_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    pub log_level: Option<String>,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub continue_on_error: Option<bool>,
    pub dry_run: Option<bool>,
}

impl PartialConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config: PartialConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;
        Ok(config)
    }

    /// Fill every unset field from `fallback`
    pub fn or(self, fallback: PartialConfig) -> Self {
        Self {
            source_path: self.source_path.or(fallback.source_path),
            replica_path: self.replica_path.or(fallback.replica_path),
            log_path: self.log_path.or(fallback.log_path),
            interval: self.interval.or(fallback.interval),
            log_level: self.log_level.or(fallback.log_level),
            hash_algorithm: self.hash_algorithm.or(fallback.hash_algorithm),
            continue_on_error: self.continue_on_error.or(fallback.continue_on_error),
            dry_run: self.dry_run.or(fallback.dry_run),
        }
    }
}

/// Fully resolved, immutable configuration for a mirror run
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub log_path: PathBuf,
    pub interval: Duration,
    pub log_level: String,
    pub options: MirrorOptions,
}

impl MirrorConfig {
    pub fn resolve(partial: PartialConfig) -> Result<Self> {
        let Some(source) = partial.source_path else {
            bail!("Missing required source path (--source-path)");
        };
        let Some(replica) = partial.replica_path else {
            bail!("Missing required replica path (--replica-path)");
        };
        let Some(log_path) = partial.log_path else {
            bail!("Missing required log file path (--log-path)");
        };
        let Some(interval) = partial.interval else {
            bail!("Missing required sync interval (--interval)");
        };

        let options = MirrorOptions {
            hash_algorithm: partial.hash_algorithm.unwrap_or_default(),
            continue_on_error: partial.continue_on_error.unwrap_or(false),
            dry_run: partial.dry_run.unwrap_or(false),
            ..MirrorOptions::default()
        };

        let config = Self {
            source,
            replica,
            log_path,
            interval,
            log_level: partial.log_level.unwrap_or_else(default_log_level),
            options,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            bail!("Sync interval must be greater than zero");
        }

        if !self.source.is_dir() {
            bail!("Source path is not an existing directory: {}", self.source.display());
        }

        let source = normalize(&self.source)?;
        let replica = normalize(&self.replica)?;

        if replica.starts_with(&source) {
            bail!(
                "Replica path {} must not be inside the source path {}",
                self.replica.display(),
                self.source.display()
            );
        }
        if source.starts_with(&replica) {
            bail!(
                "Source path {} must not be inside the replica path {}",
                self.source.display(),
                self.replica.display()
            );
        }

        if self.log_path.is_dir() {
            bail!("Log path is a directory: {}", self.log_path.display());
        }

        Ok(())
    }
}

/// Absolute path with every existing prefix canonicalized
fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn default_log_level() -> String {
    "info".to_string()
}
