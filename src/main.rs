//! conda-provision - command-line entry point.
//!
//! Each subcommand performs one provisioning operation against the provisioning root
//! derived from the settings (`<project_dir>/<conda_dir>`), then logs a metrics summary.
//!
//! # Execution Flow
//!
//! 1. Parse arguments and initialize logging (rolling file in `--log-dir`, console unless
//!    `--quiet`)
//! 2. Load settings: defaults, `conda-provision.yaml`, `CONDA_PROVISION_*` variables
//! 3. Resolve host and target platforms (`CONDA_ARCH_OVERRIDE` redirects the target)
//! 4. Run the command on a current-thread tokio runtime; every resolver call is awaited
//!    before the next one starts
//!
//! # Files
//!
//! Inside the provisioning root:
//! - `pixi` / `pixi.exe`: the resolver binary, downloaded on first use
//! - `pixi.toml`: resolver manifest
//! - `.config.json`: per-package clean rules and shared-data folders
//! - `Plugins/<OS>/<Arch>/`: materialized environments

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use conda_provision::config::SETTINGS_FILE;
use conda_provision::services::{resolve, HttpFetcher, SystemHost, ToolInvoker, TreeShakeReport};
use conda_provision::{
    APP_NAME, ConfigManager, Metrics, PackageDescriptor, Platform, Provisioner, Settings,
    VERSION,
};
use std::fs;
use std::sync::Arc;

/// Provision platform-specific conda environments into an application's plugin tree
#[derive(Parser)]
#[command(name = "conda-provision")]
#[command(version)]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    settings: Utf8PathBuf,

    /// Override the project directory from the settings
    #[arg(long, global = true)]
    project_dir: Option<Utf8PathBuf>,

    /// Debug-level logging
    #[arg(long, global = true)]
    debug: bool,

    #[arg(long, global = true, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Log to the file only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the resolver and initialize the manifest if needed
    Bootstrap,
    /// Add packages to the manifest and install the target platform
    Add {
        /// Package specs, e.g. "gdal>=3.9"
        #[arg(required = true)]
        specs: Vec<String>,

        /// JSON file with the package's clean rules and shared data
        #[arg(long)]
        descriptor: Option<Utf8PathBuf>,
    },
    /// Install the environment for a platform and prune it
    Install {
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Re-run shared-data staging and pruning without reinstalling
    Prune {
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// List installed packages
    List,
    /// Show resolver and manifest information
    Info,
    /// Exit with status 0 if NAME at VERSION is installed, 1 otherwise
    IsInstalled { name: String, version: String },
    /// Show which target platforms are installed
    Status,
    /// Remove the installed environment of a platform
    Uninstall {
        #[arg(long)]
        platform: Platform,
    },
    /// Print the effective settings
    Settings {
        /// Write them to the settings file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let guard = conda_provision::logging::setup_logging(
        &cli.log_dir,
        "conda-provision",
        cli.debug,
        !cli.quiet,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.settings);
    let mut settings = config_manager.load_settings()?;
    if let Some(project_dir) = cli.project_dir {
        settings.project_dir = project_dir;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(run(cli.command, &config_manager, settings, metrics.clone()));

    metrics.log_summary();

    match result {
        Ok(code) => {
            if code != 0 {
                drop(guard);
                std::process::exit(code);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            Err(e)
        }
    }
}

async fn run(
    command: Commands,
    config_manager: &ConfigManager,
    settings: Settings,
    metrics: Arc<Metrics>,
) -> Result<i32> {
    let open = || -> Result<Provisioner<ToolInvoker, HttpFetcher>> {
        let resolution = resolve(&SystemHost, &settings.arch_override_var)?;
        Provisioner::from_settings(&settings, resolution, metrics.clone())
    };

    match command {
        Commands::Settings { write } => {
            print!("{}", ConfigManager::render_settings(&settings)?);
            if write {
                config_manager.save_settings(&settings)?;
            }
        }
        Commands::Bootstrap => {
            let outcome = open()?.bootstrap().await?;
            println!(
                "Resolver {}, manifest {}",
                if outcome.downloaded { "downloaded" } else { "present" },
                if outcome.initialized { "initialized" } else { "present" }
            );
        }
        Commands::Add { specs, descriptor } => {
            let descriptor = descriptor.map(|path| load_descriptor(&path)).transpose()?;
            let report = open()?.add(&specs.join(" "), descriptor).await?;
            print_tree_shake(&report);
        }
        Commands::Install { platform } => {
            let mut provisioner = open()?;
            let target = platform.unwrap_or(provisioner.context().target);
            print_tree_shake(&provisioner.install(target).await?);
        }
        Commands::Prune { platform } => {
            let mut provisioner = open()?;
            let target = platform.unwrap_or(provisioner.context().target);
            print_tree_shake(&provisioner.tree_shake(target)?);
        }
        Commands::List => {
            let items = open()?.info().await?;
            for item in items.iter().filter(|i| i.is_primary()) {
                println!("{} {} ({})", item.name, item.version, item.build_string);
            }
            let dependencies: Vec<_> = items
                .iter()
                .filter(|i| !i.is_primary() && !i.is_runtime_redistributable())
                .collect();
            if !dependencies.is_empty() {
                println!("Dependencies:");
                for item in dependencies {
                    println!("  {} {}", item.name, item.version);
                }
            }
        }
        Commands::Info => {
            let info = open()?.resolver_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::IsInstalled { name, version } => {
            let installed = open()?.is_installed(&name, &version).await;
            println!("{}", installed);
            return Ok(if installed { 0 } else { 1 });
        }
        Commands::Status => {
            for (platform, status) in open()?.platform_status() {
                println!("{:<14} {}", platform.to_string(), status);
            }
        }
        Commands::Uninstall { platform } => {
            if open()?.uninstall(platform)? {
                println!("Removed {}", platform);
            } else {
                println!("{} is not installed", platform);
            }
        }
    }

    Ok(0)
}

fn load_descriptor(path: &Utf8Path) -> Result<PackageDescriptor> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read descriptor: {}", path))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse descriptor: {}", path))
}

fn print_tree_shake(report: &TreeShakeReport) {
    println!(
        "Staged {} files, removed {} entries",
        report.staging.copied.len(),
        report.prune.deleted.len()
    );
    for folder in &report.staging.rejected {
        println!("warning: shared data entry '{}' is not a plain folder name", folder);
    }
    for warning in &report.prune.warnings {
        println!("warning: {}", warning);
    }
}
