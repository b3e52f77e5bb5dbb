use anyhow::Result;
use clap::Parser;
use replica_sync::HashAlgorithm;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

mod config;
mod driver;
mod telemetry;

use config::{MirrorConfig, PartialConfig};
use driver::MirrorDriver;

#[derive(Parser)]
#[command(name = "replica-daemon")]
#[command(about = "Keep a replica folder identical to a source folder")]
#[command(version)]
struct Cli {
    /// Folder to mirror from (never modified)
    #[arg(long, alias = "source_path")]
    source_path: Option<PathBuf>,

    /// Folder to mirror into
    #[arg(long, alias = "replica_path")]
    replica_path: Option<PathBuf>,

    /// Log file, appended to across runs
    #[arg(long, alias = "log_path")]
    log_path: Option<PathBuf>,

    /// Seconds to wait between sync ticks
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// TOML configuration file; command-line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Content hash used to compare files (blake3, sha256)
    #[arg(long = "hash", value_name = "ALGORITHM")]
    hash_algorithm: Option<HashAlgorithm>,

    /// Keep applying the remaining operations when one fails
    #[arg(long)]
    continue_on_error: bool,

    /// Log what would change without touching the replica
    #[arg(long)]
    dry_run: bool,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn overrides(&self) -> PartialConfig {
        PartialConfig {
            source_path: self.source_path.clone(),
            replica_path: self.replica_path.clone(),
            log_path: self.log_path.clone(),
            interval: self.interval.map(Duration::from_secs),
            log_level: self.log_level.clone(),
            hash_algorithm: self.hash_algorithm,
            continue_on_error: self.continue_on_error.then_some(true),
            dry_run: self.dry_run.then_some(true),
        }
    }

    async fn resolve_config(&self) -> Result<MirrorConfig> {
        let file = match &self.config {
            Some(path) => PartialConfig::load(path).await?,
            None => PartialConfig::default(),
        };
        MirrorConfig::resolve(self.overrides().or(file))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.resolve_config().await?;
    let _guard = telemetry::init_logging(&config.log_path, &config.log_level)?;

    info!(
        "Starting replica-daemon {} ({} hashing)",
        env!("CARGO_PKG_VERSION"),
        config.options.hash_algorithm
    );

    let driver = MirrorDriver::new(config);
    driver.bootstrap().await?;
    driver.run(cli.once).await
}
