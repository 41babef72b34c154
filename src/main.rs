//! drvdeploy - main entry point
//!
//! Resolves configuration, sets up logging and dispatches to one of the
//! modes: the default reconcile-and-install run, `init`, `search`, `scan` and
//! `parse`.

use anyhow::Context;
use drvdeploy::catalog;
use drvdeploy::cli::{Cli, Commands};
use drvdeploy::config::DeployConfig;
use drvdeploy::deploy::{Collaborators, DeployReport, format_decisions, run_deployment, run_init};
use drvdeploy::installer::{BulkOutcome, InstallOutcome};
use drvdeploy::inventory::PnpInventory;
use drvdeploy::platform::{HttpFetcher, NetUseMounter, WindowsRuntime};
use drvdeploy::run_marker::RunMarker;
use drvdeploy::search::{scan_problem_devices, search_catalog};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging: console always, plus the run log when given.
///
/// `RUST_LOG` overrides the default `info` level.
fn init_logger(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, file_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            None,
        ),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    if let (Some(path), Some(e)) = (log_file, file_error) {
        warn!("Cannot open log file {}: {}; logging to console only", path.display(), e);
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    let config = cli.resolve_config().context("failed to load configuration")?;

    // A real run writes the log file, and the log file doubles as the
    // "already ran" marker, so the check has to happen before logging starts.
    let real_run = cli.is_run() && !cli.dry_run();
    if real_run {
        let marker = RunMarker::new(&config.log_file);
        if marker.should_skip(config.force) {
            println!(
                "drvdeploy already ran on this host ({} exists); use --force to run again",
                marker.path().display()
            );
            return Ok(());
        }
    }

    init_logger(real_run.then_some(config.log_file.as_path()));
    info!("drvdeploy {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    match &cli.command {
        None | Some(Commands::Run(_)) => run_mode(&config, cli.dry_run()),
        Some(Commands::Init(_)) => init_mode(&config),
        Some(Commands::Search { hardware_id }) => search_mode(&config, hardware_id),
        Some(Commands::Scan) => scan_mode(&config),
        Some(Commands::Parse { file }) => parse_mode(file),
    }
}

/// Default mode: reconcile and install.
fn run_mode(config: &DeployConfig, dry_run: bool) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(config.http_timeout())?;
    let deps = Collaborators {
        mounter: &NetUseMounter,
        inventory: &PnpInventory,
        runtime: &WindowsRuntime,
        fetcher: &fetcher,
    };

    let report = match run_deployment(config, &deps, dry_run) {
        Ok(report) => report,
        Err(e) => {
            error!("Deployment aborted: {}", e);
            return Err(e.into());
        }
    };

    print_report(&report);

    if report.has_failures() {
        error!("Deployment finished with failures");
        std::process::exit(1);
    }
    info!("Deployment finished");
    Ok(())
}

fn print_report(report: &DeployReport) {
    println!("Machine model: {}", report.machine);
    println!("{}", format_decisions(&report.decisions));
    println!();
    println!("{}", report.summary());

    let Some(install) = &report.install else {
        return;
    };
    for entry in &install.entries {
        let file = entry.file_name.as_deref().unwrap_or("-");
        match &entry.outcome {
            InstallOutcome::Failed(reason) => {
                println!("✗ {} ({}): {}", entry.hardware_id, file, reason)
            }
            outcome => println!("✓ {} ({}): {:?}", entry.hardware_id, file, outcome),
        }
    }
    match &install.bulk {
        BulkOutcome::NothingToInstall => println!("Driver store: nothing staged"),
        BulkOutcome::Installed { inf_count } => {
            println!("Driver store: {} INF file(s) added", inf_count)
        }
        BulkOutcome::Failed(reason) => println!("✗ Driver store: {}", reason),
    }
}

/// `init`: populate the local cache.
fn init_mode(config: &DeployConfig) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(config.http_timeout())?;
    let report = run_init(config, &fetcher)?;
    info!("Cache {}: {}", config.cache_dir.display(), report);
    println!("{}", report);
    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// `search`: look up one hardware ID.
fn search_mode(config: &DeployConfig, hardware_id: &str) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(config.http_timeout())?;
    match search_catalog(hardware_id, &fetcher)? {
        Some(hit) => println!("{}", hit.to_catalog_row()),
        None => println!("No Update Catalog result for {}", hardware_id),
    }
    Ok(())
}

/// `scan`: look up every device with a problem status.
fn scan_mode(config: &DeployConfig) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(config.http_timeout())?;
    let hits = scan_problem_devices(&PnpInventory, &fetcher)?;
    if hits.is_empty() {
        println!("No catalog rows to suggest");
    }
    for hit in hits {
        println!("{}", hit.to_catalog_row());
    }
    Ok(())
}

/// `parse`: dump a catalog file as JSON.
fn parse_mode(file: &Path) -> anyhow::Result<()> {
    let entries = catalog::load_catalog_file(file)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
