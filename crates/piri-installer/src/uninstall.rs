use std::fs;
use std::io;
use std::path::Path;

use piri_fs::FsError;
use piri_process::Executor;
use tracing::{info, warn};

use crate::context::InstallContext;
use crate::error::InstallerError;

/// Runs the uninstall procedure (spec §4.4 "Uninstall"): stop and disable
/// both units, remove the host-supervisor unit symlinks, the PATH
/// convenience symlink, and the privilege-escalation file, then
/// daemon_reload. Binaries and configuration under `<opt>` are left in
/// place so a later reinstall retains version history.
///
/// Best-effort throughout: every removal tolerates the target already
/// being absent, so uninstall is safe to run against a partially-installed
/// or already-uninstalled host.
pub fn uninstall<E: Executor>(ctx: &InstallContext<E>) -> Result<(), InstallerError> {
    let paths = &ctx.paths;
    let units = [paths.main_unit.as_str(), paths.update_timer_unit.as_str()];

    for unit in units {
        if let Err(e) = ctx.service.stop_and_disable(unit) {
            warn!(unit, error = %e, "failed to stop/disable unit during uninstall, continuing");
        }
    }

    for unit in units {
        remove_if_exists(&paths.host_unit_path(unit))?;
    }

    remove_if_exists(&paths.path_symlink)?;
    remove_if_exists(&paths.sudoers_path)?;

    ctx.service.daemon_reload()?;

    info!("uninstall complete; binaries under the managed root were preserved");
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), InstallerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallerError::Fs(FsError::Io { path: path.to_path_buf(), source: e })),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use piri_environment::{HostEnvironment, InitSystem, Platform};
    use piri_process::RecordingExecutor;
    use piri_service::ServiceManager;

    use super::*;
    use crate::paths::PathConfig;

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

    #[test]
    fn uninstall_removes_symlinks_and_files_but_preserves_bin() {
        let td = tempfile::tempdir().unwrap();
        let paths_cfg = paths(td.path());

        std::fs::create_dir_all(paths_cfg.bin_dir("1.0.0")).unwrap();
        std::fs::write(paths_cfg.bin_path("1.0.0"), b"binary").unwrap();
        std::fs::create_dir_all(paths_cfg.host_units_dir.clone()).unwrap();
        std::fs::write(paths_cfg.host_unit_path("piri.service"), b"[Unit]\n").unwrap();
        std::fs::write(paths_cfg.host_unit_path("piri-update.timer"), b"[Unit]\n").unwrap();
        std::fs::create_dir_all(paths_cfg.path_symlink.parent().unwrap()).unwrap();
        std::fs::write(&paths_cfg.path_symlink, b"link").unwrap();
        std::fs::create_dir_all(paths_cfg.sudoers_path.parent().unwrap()).unwrap();
        std::fs::write(&paths_cfg.sudoers_path, paths_cfg.privilege_escalation_rule()).unwrap();

        let exec = RecordingExecutor::new();
        exec.on(&["systemctl", "stop", "piri.service"], Ok(vec![]));
        exec.on(&["systemctl", "disable", "piri.service"], Ok(vec![]));
        exec.on(&["systemctl", "stop", "piri-update.timer"], Ok(vec![]));
        exec.on(&["systemctl", "disable", "piri-update.timer"], Ok(vec![]));
        exec.on(&["systemctl", "daemon-reload"], Ok(vec![]));
        let service = ServiceManager::new(exec, "systemctl");
        let ctx = InstallContext::new(paths_cfg.clone(), service, environment());

        uninstall(&ctx).unwrap();

        assert!(!paths_cfg.host_unit_path("piri.service").exists());
        assert!(!paths_cfg.host_unit_path("piri-update.timer").exists());
        assert!(!paths_cfg.path_symlink.exists());
        assert!(!paths_cfg.sudoers_path.exists());
        assert!(paths_cfg.bin_path("1.0.0").exists());
    }

    #[test]
    fn uninstall_tolerates_already_absent_files() {
        let td = tempfile::tempdir().unwrap();
        let paths_cfg = paths(td.path());

        let exec = RecordingExecutor::new();
        exec.on(&["systemctl", "stop", "piri.service"], Err("Unit piri.service not found.".to_string()));
        exec.on(&["systemctl", "disable", "piri.service"], Err("Unit piri.service not found.".to_string()));
        exec.on(&["systemctl", "stop", "piri-update.timer"], Err("Unit piri-update.timer not found.".to_string()));
        exec.on(&["systemctl", "disable", "piri-update.timer"], Err("Unit piri-update.timer not found.".to_string()));
        exec.on(&["systemctl", "daemon-reload"], Ok(vec![]));
        let service = ServiceManager::new(exec, "systemctl");
        let ctx = InstallContext::new(paths_cfg.clone(), service, environment());

        uninstall(&ctx).unwrap();
    }
}
