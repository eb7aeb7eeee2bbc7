use piri_fs::FsManager;
use piri_process::Executor;
use tracing::{error, info, warn};

use crate::context::InstallContext;
use crate::error::InstallerError;
use crate::prereqs::check_install_prereqs;
use crate::unit::UnitRenderer;

/// The install procedure's inputs (spec §4.4 "Install state machine").
pub struct InstallRequest<'a> {
    pub version: String,
    pub binary_bytes: Vec<u8>,
    pub config_contents: Vec<u8>,
    pub unit_renderer: &'a dyn UnitRenderer,
    pub enable_auto_update: bool,
    /// Skip the "destination already exists" prerequisite check.
    pub force: bool,
}

/// Runs the install state machine (spec §4.4). Every step after
/// `create_layout` contributes to the rollback journal; on any failure
/// after that point the main and timer units are stopped (idempotently)
/// and the filesystem journal is rolled back before the original error is
/// returned.
pub fn install<E: Executor>(ctx: &InstallContext<E>, req: InstallRequest<'_>) -> Result<(), InstallerError> {
    let paths = &ctx.paths;
    let units = [paths.main_unit.as_str(), paths.update_timer_unit.as_str()];
    let destinations = vec![paths.bin_current(), paths.systemd_current(), paths.config_path()];

    check_install_prereqs(&ctx.environment, &ctx.target_platform, &ctx.service, &units, &destinations, req.force)?;

    let mut fs = FsManager::new();
    match run_install_steps(ctx, &mut fs, &req) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "install failed, rolling back");
            if let Err(stop_err) = ctx.service.stop_all(&units) {
                warn!(error = %stop_err, "failed to stop units during install rollback");
            }
            if let Err(rollback_err) = fs.rollback() {
                warn!(error = %rollback_err, "filesystem rollback encountered errors");
            }
            Err(e)
        }
    }
}

fn run_install_steps<E: Executor>(
    ctx: &InstallContext<E>,
    fs: &mut FsManager,
    req: &InstallRequest<'_>,
) -> Result<(), InstallerError> {
    let paths = &ctx.paths;
    let version = req.version.as_str();

    // Step 2: create_layout
    fs.create_directory(&paths.bin_dir(version), 0o755)?;
    fs.create_directory(&paths.systemd_dir(version), 0o755)?;
    fs.create_directory(&paths.etc_dir(), 0o755)?;
    info!(version, "created versioned layout");

    // Step 3: install_binary
    fs.write_file(&paths.bin_path(version), &req.binary_bytes, 0o755)?;
    fs.create_symlink(&paths.bin_dir(version), &paths.bin_current())?;

    // Step 4: install_config
    fs.write_file(&paths.config_path(), &req.config_contents, 0o644)?;

    // Step 5: install_units
    let units = req.unit_renderer.render(version, paths);
    for unit in &units {
        fs.write_file(&paths.systemd_dir(version).join(&unit.file_name), unit.contents.as_bytes(), 0o644)?;
    }
    fs.create_symlink(&paths.systemd_dir(version), &paths.systemd_current())?;
    for unit in &units {
        fs.create_symlink(&paths.systemd_current().join(&unit.file_name), &paths.host_unit_path(&unit.file_name))?;
    }
    ctx.service.daemon_reload()?;

    // Step 6: chown
    fs.set_ownership(&paths.opt_dir, &paths.service_user)?;

    // Step 7: install_privilege_escalation_file
    fs.write_file(&paths.sudoers_path, paths.privilege_escalation_rule().as_bytes(), 0o440)?;

    // Step 8: create_path_symlink — best-effort, PATH convenience only.
    if let Err(e) = fs.create_symlink(&paths.bin_current().join(&paths.binary_name), &paths.path_symlink) {
        warn!(error = %e, "failed to create PATH convenience symlink, continuing");
    }

    // Step 9: enable_and_start
    ctx.service.enable(&paths.main_unit)?;
    ctx.service.start(&paths.main_unit)?;
    if req.enable_auto_update {
        ctx.service.enable(&paths.update_timer_unit)?;
        ctx.service.start(&paths.update_timer_unit)?;
    }

    info!(version, "install complete");
    Ok(())
}
