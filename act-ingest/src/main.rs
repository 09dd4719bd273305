//! act-ingest - accelerometer session ingest
//!
//! Copies raw accelerometer files from the network drop into the canonical
//! `sub-<id>/accel/ses-<n>` tree of the matching study, keeping session
//! numbers dense and chronological, and records the result in the JSON
//! manifest. `--rebuild-manifest-only` reconstructs the manifest from the
//! tree instead.

use act_common::config::{ConfigResolver, IngestConfig};
use act_common::ManifestStore;
use act_ingest::drop_listing::{cutoff_date, scan_drop};
use act_ingest::registry::RegistrySnapshot;
use act_ingest::{IngestPipeline, PipelineSettings};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "act-ingest";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "act-ingest", version, about = "Accelerometer session ingest")]
struct Args {
    /// System path profile from the config file
    #[arg(long)]
    system: String,

    /// Config file (overrides ACT_CONFIG and the default locations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Manifest file (overrides the config value)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Registry export: JSON array of {subject_id, lab_id}
    #[arg(long, env = "ACT_REGISTRY")]
    registry: PathBuf,

    /// Only consider drop files from the last N days
    #[arg(long, value_parser = clap::value_parser!(u32))]
    days_ago: Option<u32>,

    /// Rebuild the manifest from the session tree and exit
    #[arg(long)]
    rebuild_manifest_only: bool,

    /// Maintain sub-*/accel/all link trees
    #[arg(long)]
    link_sessions: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = ConfigResolver::new(APP_NAME).resolve(args.config.as_deref());
    let mut config = IngestConfig::load(config_path.as_deref())?;
    if args.link_sessions {
        config.link_sessions = true;
    }

    init_tracing(&config)?;
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }

    let paths = config.system(&args.system)?;
    let manifest_path = args.manifest.clone().unwrap_or_else(|| config.manifest_path.clone());
    info!(
        system = %args.system,
        int_dir = %paths.int_dir.display(),
        obs_dir = %paths.obs_dir.display(),
        manifest = %manifest_path.display(),
        "System profile resolved"
    );

    let drop_dir = paths.require_drop_dir()?.to_path_buf();
    let registry = RegistrySnapshot::load(&args.registry)?;
    let pipeline = IngestPipeline::new(
        paths,
        PipelineSettings::from_config(&config),
        ManifestStore::new(manifest_path),
    );

    if args.rebuild_manifest_only {
        let drop_rows = scan_drop(&drop_dir, None)?;
        let manifest = pipeline.rebuild_manifest(&registry, &drop_rows)?;
        info!("Manifest rebuilt for {} subjects", manifest.len());
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();
    let cutoff = cutoff_date(args.days_ago, config.drop_floor_date, today);
    let drop_rows = scan_drop(&drop_dir, Some(cutoff))?;
    info!("{} drop files on or after {}", drop_rows.len(), cutoff);

    let report = pipeline.run(&registry, &drop_rows)?;
    info!(
        "Committed {} subjects ({} skipped on tie dates, {} failed)",
        report.summary.committed, report.summary.skipped_tie_date, report.summary.failed
    );
    Ok(())
}

/// Install the fmt subscriber
///
/// Level: `RUST_LOG`, else the config's `[logging] level`. Output goes to
/// `LOG_FILE` or the configured file when set, otherwise stderr.
fn init_tracing(config: &IngestConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    let log_file = std::env::var_os("LOG_FILE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| config.logging.file.clone());

    match log_file {
        Some(path) => {
            let file = open_log_file(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}
