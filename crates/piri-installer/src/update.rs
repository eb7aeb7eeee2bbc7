use std::time::Duration;

use piri_environment::Platform;
use piri_fs::{FsManager, SymlinkRollback};
use piri_process::Executor;
use piri_release::{ReleaseClient, needs_update};
use piri_service::RestartOutcome;
use semver::Version;
use tracing::{info, warn};

use crate::context::InstallContext;
use crate::error::InstallerError;
use crate::prereqs::check_update_prereqs;
use crate::status::NodeStatusClient;
use crate::unit::UnitRenderer;

/// What a managed-update cycle decided to do. Every variant other than
/// `Updated` is a *non-error* outcome (spec §6 exit codes: "the updater
/// uses exit 0 even when declining to update... to avoid supervisor
/// alarm").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    NodeBusy,
    AlreadyLatest,
    AlreadyInstalled { version: String },
    Updated { version: String },
}

pub struct UpdateRequest<'a> {
    pub current_version: Version,
    pub release_client: &'a ReleaseClient,
    pub status_client: &'a dyn NodeStatusClient,
    pub unit_renderer: &'a dyn UnitRenderer,
}

/// Runs one managed-update cycle (spec §4.4 "Managed update"). Returns the
/// non-error outcome when there is nothing to do; returns an error only for
/// genuine failures (download, verification, or restart-and-rollback
/// failure).
pub async fn run_managed_update<E: Executor>(
    ctx: &InstallContext<E>,
    req: UpdateRequest<'_>,
) -> Result<UpdateOutcome, InstallerError> {
    check_update_prereqs(&ctx.environment, &ctx.target_platform, &ctx.paths)?;

    let status = req.status_client.status().await.map_err(InstallerError::Remote)?;
    if !status.safe_to_restart() {
        info!(?status, "node reports it is unsafe to restart this cycle");
        return Ok(UpdateOutcome::NodeBusy);
    }

    let release = req.release_client.fetch_latest().await.map_err(InstallerError::Remote)?;
    let latest = release.version().map_err(InstallerError::Remote)?;
    if !needs_update(&req.current_version, &latest) {
        info!(current = %req.current_version, latest = %latest, "already at latest version");
        return Ok(UpdateOutcome::AlreadyLatest);
    }
    let version = latest.to_string();

    let new_bin_dir = ctx.paths.bin_dir(&version);
    let new_bin_path = ctx.paths.bin_path(&version);
    let current_target = std::fs::read_link(ctx.paths.bin_current()).ok();

    if new_bin_path.exists() && current_target.as_deref() == Some(new_bin_dir.as_path()) {
        info!(version, "already installed and active");
        return Ok(UpdateOutcome::AlreadyInstalled { version });
    }

    if new_bin_dir.exists() {
        warn!(version, "removing leftover directory from a failed prior attempt");
        std::fs::remove_dir_all(&new_bin_dir).map_err(|e| {
            InstallerError::Remote(anyhow::anyhow!("failed to clean up {}: {e}", new_bin_dir.display()))
        })?;
    }

    apply_update(ctx, &req, &release, &version).await?;
    Ok(UpdateOutcome::Updated { version })
}

async fn apply_update<E: Executor>(
    ctx: &InstallContext<E>,
    req: &UpdateRequest<'_>,
    release: &piri_release::Release,
    version: &str,
) -> Result<(), InstallerError> {
    let paths = &ctx.paths;
    let mut fs = FsManager::new();

    fs.create_directory(&paths.bin_dir(version), 0o755)?;
    let binary = req
        .release_client
        .resolve_release(release, &ctx.target_platform, &paths.binary_name)
        .await
        .map_err(InstallerError::Remote)?;
    fs.write_file(&paths.bin_path(version), &binary, 0o755)?;
    fs.set_ownership(&paths.bin_dir(version), &paths.service_user)?;

    let (_, bin_rollback) = fs.update_symlink_atomic(&paths.bin_current(), &paths.bin_dir(version))?;

    fs.create_directory(&paths.systemd_dir(version), 0o755)?;
    for unit in req.unit_renderer.render(version, paths) {
        fs.write_file(&paths.systemd_dir(version).join(&unit.file_name), unit.contents.as_bytes(), 0o644)?;
    }
    fs.set_ownership(&paths.systemd_dir(version), &paths.service_user)?;
    let (_, unit_rollback) = fs.update_symlink_atomic(&paths.systemd_current(), &paths.systemd_dir(version))?;

    ctx.service.daemon_reload()?;

    match ctx.service.verify_restart(&paths.main_unit, Duration::from_secs(10), true)? {
        RestartOutcome::Ok => {
            info!(version, "update applied and unit verified active");
            Ok(())
        }
        RestartOutcome::NotActive(reason) => rollback_after_failed_restart(ctx, bin_rollback, unit_rollback, reason),
        RestartOutcome::TimedOut => {
            rollback_after_failed_restart(ctx, bin_rollback, unit_rollback, "timed out waiting for active".to_string())
        }
    }
}

fn rollback_after_failed_restart<E: Executor>(
    ctx: &InstallContext<E>,
    bin_rollback: SymlinkRollback,
    unit_rollback: SymlinkRollback,
    update_reason: String,
) -> Result<(), InstallerError> {
    let rollback_result = (|| -> Result<(), InstallerError> {
        bin_rollback.apply()?;
        unit_rollback.apply()?;
        ctx.service.daemon_reload()?;
        match ctx.service.verify_restart(&ctx.paths.main_unit, Duration::from_secs(10), true)? {
            RestartOutcome::Ok => Ok(()),
            RestartOutcome::NotActive(r) => Err(InstallerError::Remote(anyhow::anyhow!(r))),
            RestartOutcome::TimedOut => Err(InstallerError::Remote(anyhow::anyhow!("rollback restart timed out"))),
        }
    })();

    match rollback_result {
        Ok(()) => {
            warn!(reason = update_reason, "update failed verify_restart; rolled back to previous version");
            Err(InstallerError::Remote(anyhow::anyhow!(
                "update to new version failed ({update_reason}); rolled back successfully"
            )))
        }
        Err(rollback_err) => Err(InstallerError::RestartFailedAndRollbackFailed {
            update: update_reason,
            rollback: rollback_err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use piri_environment::{HostEnvironment, InitSystem};
    use piri_process::RecordingExecutor;
    use piri_release::ReleaseClient;
    use piri_service::ServiceManager;

    use super::*;
    use crate::paths::PathConfig;
    use crate::status::fake::FakeNodeStatusClient;
    use crate::status::NodeStatus;
    use crate::unit::{FixedUnitRenderer, UnitFile};

    fn platform() -> Platform {
        Platform { os: "linux".to_string(), arch: "x86_64".to_string() }
    }

    fn environment() -> HostEnvironment {
        HostEnvironment { platform: platform(), init_system: InitSystem::Systemd, is_root: true, can_elevate: false }
    }

    fn paths(root: &std::path::Path) -> PathConfig {
        PathConfig {
            opt_dir: root.join("opt"),
            host_units_dir: root.join("host-units"),
            path_symlink: root.join("bin-link/piri"),
            sudoers_path: root.join("sudoers/piri"),
            binary_name: "piri".to_string(),
            config_name: "piri.toml".to_string(),
            service_user: std::env::var("USER").unwrap_or_else(|_| "root".to_string()),
            main_unit: "piri.service".to_string(),
            update_timer_unit: "piri-update.timer".to_string(),
            supervisor_cli: PathBuf::from("/usr/bin/systemctl"),
        }
    }

    fn make_managed(td: &std::path::Path, paths_cfg: &PathConfig) {
        std::fs::create_dir_all(paths_cfg.bin_dir("1.0.0")).unwrap();
        std::fs::write(paths_cfg.bin_path("1.0.0"), b"old-binary").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(paths_cfg.bin_dir("1.0.0"), paths_cfg.bin_current()).unwrap();
        let _ = td;
    }

    #[tokio::test]
    async fn node_busy_short_circuits_before_touching_filesystem() {
        let td = tempfile::tempdir().unwrap();
        let paths_cfg = paths(td.path());
        make_managed(td.path(), &paths_cfg);
        let service = ServiceManager::new(RecordingExecutor::new(), "systemctl");
        let ctx = InstallContext::new(paths_cfg.clone(), service, environment());

        let status = FakeNodeStatusClient::new(NodeStatus {
            upgrade_safe: false,
            is_proving: false,
            in_challenge_window: false,
            has_proven: true,
        });
        let release_client = ReleaseClient::new("http://unused").unwrap();
        let renderer = FixedUnitRenderer { units: vec![] };

        let outcome = run_managed_update(
            &ctx,
            UpdateRequest {
                current_version: Version::parse("1.0.0").unwrap(),
                release_client: &release_client,
                status_client: &status,
                unit_renderer: &renderer,
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, UpdateOutcome::NodeBusy);
    }

    #[test]
    fn unit_file_contents_placeholder() {
        let renderer = FixedUnitRenderer {
            units: vec![UnitFile { file_name: "piri.service".to_string(), contents: "[Unit]\n".to_string() }],
        };
        let td = tempfile::tempdir().unwrap();
        let paths_cfg = paths(td.path());
        assert_eq!(renderer.render("1.0.0", &paths_cfg).len(), 1);
    }
}
