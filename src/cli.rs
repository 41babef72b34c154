use crate::config::DeployConfig;
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// drvdeploy - keep Windows device drivers in line with a shared catalog
#[derive(Parser, Debug)]
#[command(name = "drvdeploy")]
#[command(about = "Install missing or outdated drivers listed in a shared markdown catalog")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (flags and environment override its values)
    #[arg(long, global = true, env = "DRVDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file path. For the default run it is also the "already ran" marker.
    #[arg(long, global = true, env = "DRVDEPLOY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, global = true, env = "DRVDEPLOY_HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile this host against the catalog and install what is missing (default)
    Run(RunArgs),
    /// Download every catalog package into a local cache
    Init(InitArgs),
    /// Look up one hardware ID on the Microsoft Update Catalog
    Search {
        /// Hardware or device instance ID (e.g. PCI\VEN_10DE&DEV_2206)
        hardware_id: String,
    },
    /// Look up every device reporting a problem status
    Scan,
    /// Parse a catalog file and print its entries as JSON
    Parse {
        /// Catalog markdown file
        file: PathBuf,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Distribution root: UNC share or local directory
    #[arg(short, long, env = "DRVDEPLOY_DISTRIBUTION")]
    pub distribution: Option<String>,

    /// Share user (DOMAIN\user)
    #[arg(short, long, env = "DRVDEPLOY_SHARE_USER")]
    pub user: Option<String>,

    /// Share password
    #[arg(long, env = "DRVDEPLOY_SHARE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Run even if this host already ran a deployment
    #[arg(short, long)]
    pub force: bool,

    /// Working directory for downloaded packages
    #[arg(long, env = "DRVDEPLOY_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Reconcile and print decisions without installing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// URL of the published catalog document
    #[arg(long, env = "DRVDEPLOY_CATALOG_URL")]
    pub catalog_url: Option<String>,

    /// Download from mirror URLs instead of primary URLs
    #[arg(short, long)]
    pub mirror: bool,

    /// Cache directory to populate
    #[arg(long, env = "DRVDEPLOY_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Build the effective configuration: defaults, then the `--config` file,
    /// then flags and environment.
    pub fn resolve_config(&self) -> Result<DeployConfig> {
        let mut config = match &self.config {
            Some(path) => DeployConfig::load_from_file(path)?,
            None => DeployConfig::default(),
        };

        if let Some(log_file) = &self.log_file {
            config.log_file = log_file.clone();
        }
        if let Some(secs) = self.http_timeout {
            config.http_timeout_secs = secs;
        }

        match &self.command {
            Some(Commands::Run(args)) => args.apply(&mut config),
            Some(Commands::Init(args)) => args.apply(&mut config),
            _ => {}
        }
        Ok(config)
    }

    /// Whether this invocation is the default reconcile-and-install run.
    pub fn is_run(&self) -> bool {
        matches!(self.command, None | Some(Commands::Run(_)))
    }

    pub fn dry_run(&self) -> bool {
        matches!(&self.command, Some(Commands::Run(args)) if args.dry_run)
    }
}

impl RunArgs {
    fn apply(&self, config: &mut DeployConfig) {
        if let Some(distribution) = &self.distribution {
            config.distribution_path = distribution.clone();
        }
        if let Some(user) = &self.user {
            config.credentials.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.credentials.password = password.clone();
        }
        if let Some(staging) = &self.staging_dir {
            config.staging_dir = staging.clone();
        }
        config.force |= self.force;
    }
}

impl InitArgs {
    fn apply(&self, config: &mut DeployConfig) {
        if let Some(url) = &self.catalog_url {
            config.catalog_url = url.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
        config.use_mirror |= self.mirror;
    }
}
