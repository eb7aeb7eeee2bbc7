use std::path::PathBuf;

use piri_environment::{HostEnvironment, InitSystem, Platform};
use piri_fs::FsManager;
use piri_process::Executor;
use piri_service::{ServiceManager, UnitState};

use crate::error::InstallerError;
use crate::paths::PathConfig;

/// Install prerequisite checks (spec §4.4 step 1): host OS matches the
/// target, a supervisor is present, the caller has sufficient privilege,
/// none of the named units is currently active, and (unless `force`) none
/// of the enumerated destination files already exists.
pub fn check_install_prereqs<E: Executor>(
    env: &HostEnvironment,
    target_platform: &Platform,
    service: &ServiceManager<E>,
    units: &[&str],
    destinations: &[PathBuf],
    force: bool,
) -> Result<(), InstallerError> {
    check_host_and_privilege(env, target_platform)?;

    for unit in units {
        if service.is_active(unit)? == UnitState::Active {
            return Err(InstallerError::UnitStillRunning(unit.to_string()));
        }
    }

    if !force {
        let fs = FsManager::new();
        fs.check_existing_files(destinations)?;
    }

    Ok(())
}

fn check_host_and_privilege(env: &HostEnvironment, target_platform: &Platform) -> Result<(), InstallerError> {
    if &env.platform != target_platform {
        return Err(InstallerError::PlatformUnsupported {
            host: env.platform.to_string(),
            target: target_platform.to_string(),
        });
    }
    if env.init_system != InitSystem::Systemd {
        return Err(InstallerError::SupervisorMissing);
    }
    if !env.has_sufficient_privilege() {
        return Err(InstallerError::NotPrivileged);
    }
    Ok(())
}

/// Managed-update prerequisites (spec §4.4 managed update step 1): host +
/// supervisor as for install, plus the existing layout must already be a
/// managed installation — `bin/current` must resolve to a real directory.
pub fn check_update_prereqs(env: &HostEnvironment, target_platform: &Platform, paths: &PathConfig) -> Result<(), InstallerError> {
    check_host_and_privilege(env, target_platform)?;

    let bin_current = paths.bin_current();
    if std::fs::read_link(&bin_current).is_err() {
        return Err(InstallerError::NotManaged(format!(
            "{} is not a symlink; this host has no managed installation",
            bin_current.display()
        )));
    }
    Ok(())
}
