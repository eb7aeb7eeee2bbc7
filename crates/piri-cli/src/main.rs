//! `piri`: the command-line adapter onto Piri's Installer/Updater state
//! machines and a running node's admin HTTP surface.
//!
//! `install`/`update`/`uninstall` drive `piri-installer` directly against
//! the local host. `admin` never touches the local filesystem or
//! supervisor at all — it is a thin `reqwest` client against a node's own
//! `/admin/*` routes (spec §6), built the same way
//! `piri_installer::HttpNodeStatusClient` talks to that same surface.

mod admin;
mod units;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use piri_environment::HostEnvironment;
use piri_installer::{
    HttpNodeStatusClient, InstallContext, InstallRequest, PathConfig, UpdateRequest, install, run_managed_update,
    uninstall,
};
use piri_process::SystemExecutor;
use piri_release::ReleaseClient;
use piri_service::ServiceManager;
use semver::Version;
use tracing_subscriber::EnvFilter;

use crate::units::SystemdUnitRenderer;

#[derive(Parser)]
#[command(name = "piri", version, about = "Install, update, and administer a Piri storage-provider node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install a node from a locally-resolved binary and config.
    Install(InstallArgs),
    /// Run one managed-update cycle against the release feed.
    Update(UpdateArgs),
    /// Stop, disable, and unwind a managed installation.
    Uninstall(PathArgs),
    /// Administer a running node over its authenticated admin HTTP surface.
    Admin(admin::AdminArgs),
}

/// The on-disk/service layout every install/update/uninstall call needs
/// (spec §3 "Path layout"). Defaults match the conventional single-node
/// layout; every field is overridable for hosts that deviate from it.
#[derive(clap::Args, Clone)]
struct PathArgs {
    #[arg(long, default_value = "/opt/piri")]
    opt_dir: PathBuf,
    #[arg(long, default_value = "/etc/systemd/system")]
    host_units_dir: PathBuf,
    #[arg(long, default_value = "/usr/local/bin/piri")]
    path_symlink: PathBuf,
    #[arg(long, default_value = "/etc/sudoers.d/piri")]
    sudoers_path: PathBuf,
    #[arg(long, default_value = "piri")]
    binary_name: String,
    #[arg(long, default_value = "piri.toml")]
    config_name: String,
    #[arg(long, default_value = "piri")]
    service_user: String,
    #[arg(long, default_value = "piri.service")]
    main_unit: String,
    #[arg(long, default_value = "piri-update.timer")]
    update_timer_unit: String,
    #[arg(long, default_value = "/usr/bin/systemctl")]
    supervisor_cli: PathBuf,
}

impl PathArgs {
    fn into_path_config(self) -> PathConfig {
        PathConfig {
            opt_dir: self.opt_dir,
            host_units_dir: self.host_units_dir,
            path_symlink: self.path_symlink,
            sudoers_path: self.sudoers_path,
            binary_name: self.binary_name,
            config_name: self.config_name,
            service_user: self.service_user,
            main_unit: self.main_unit,
            update_timer_unit: self.update_timer_unit,
            supervisor_cli: self.supervisor_cli,
        }
    }
}

#[derive(clap::Args)]
struct InstallArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// Version being installed, e.g. `1.2.3`.
    #[arg(long)]
    version: String,
    /// Path to the resolved binary to install.
    #[arg(long)]
    binary: PathBuf,
    /// Path to the config document to install.
    #[arg(long)]
    config: PathBuf,
    /// Also enable and start the auto-update timer.
    #[arg(long)]
    enable_auto_update: bool,
    /// Skip the "destination already exists" prerequisite check.
    #[arg(long)]
    force: bool,
}

#[derive(clap::Args)]
struct UpdateArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// The version currently installed.
    #[arg(long)]
    current_version: String,
    /// The release feed URL to check for a newer version.
    #[arg(long)]
    feed_url: String,
    /// The running node's own admin HTTP base URL, e.g. `http://127.0.0.1:8080`.
    #[arg(long)]
    base_url: String,
    /// Bearer token for the node's admin surface.
    #[arg(long)]
    token: String,
}

fn build_context(paths: PathArgs) -> Result<InstallContext<SystemExecutor>> {
    let environment = HostEnvironment::detect().context("failed to detect host environment")?;
    let paths = paths.into_path_config();
    let supervisor_cli = paths.supervisor_cli.to_string_lossy().into_owned();
    let service = ServiceManager::new(SystemExecutor, supervisor_cli);
    Ok(InstallContext::new(paths, service, environment))
}

fn run_install(args: InstallArgs) -> Result<()> {
    let ctx = build_context(args.paths)?;
    let binary_bytes = std::fs::read(&args.binary)
        .with_context(|| format!("failed to read binary at {}", args.binary.display()))?;
    let config_contents = std::fs::read(&args.config)
        .with_context(|| format!("failed to read config at {}", args.config.display()))?;
    let renderer = SystemdUnitRenderer;
    let req = InstallRequest {
        version: args.version.clone(),
        binary_bytes,
        config_contents,
        unit_renderer: &renderer,
        enable_auto_update: args.enable_auto_update,
        force: args.force,
    };
    install(&ctx, req)?;
    tracing::info!(version = %args.version, "install complete");
    println!("installed piri {}", args.version);
    Ok(())
}

async fn run_update(args: UpdateArgs) -> Result<()> {
    let current_version = Version::parse(&args.current_version)
        .with_context(|| format!("{} is not a valid version", args.current_version))?;
    let ctx = build_context(args.paths)?;
    let release_client = ReleaseClient::new(&args.feed_url)?;
    let status_client = HttpNodeStatusClient::new(&args.base_url, &args.token)?;
    let renderer = SystemdUnitRenderer;

    let req = UpdateRequest {
        current_version,
        release_client: &release_client,
        status_client: &status_client,
        unit_renderer: &renderer,
    };
    let outcome = run_managed_update(&ctx, req).await?;
    tracing::info!(?outcome, "managed update cycle finished");
    println!("{outcome:?}");
    Ok(())
}

fn run_uninstall(paths: PathArgs) -> Result<()> {
    let ctx = build_context(paths)?;
    uninstall(&ctx)?;
    tracing::info!("uninstall complete");
    println!("uninstalled");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Install(args) => run_install(args),
        Command::Update(args) => run_update(args).await,
        Command::Uninstall(paths) => run_uninstall(paths),
        Command::Admin(args) => admin::run(args).await,
    }
}
