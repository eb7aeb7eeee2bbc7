use piri_environment::{HostEnvironment, Platform};
use piri_process::Executor;
use piri_service::ServiceManager;

use crate::paths::PathConfig;

/// Everything the install/update/uninstall procedures need that isn't
/// specific to a single call: the on-disk layout, the service manager, and
/// the host environment snapshot used by prerequisite checks.
pub struct InstallContext<E: Executor> {
    pub paths: PathConfig,
    pub service: ServiceManager<E>,
    pub environment: HostEnvironment,
    pub target_platform: Platform,
}

impl<E: Executor> InstallContext<E> {
    pub fn new(paths: PathConfig, service: ServiceManager<E>, environment: HostEnvironment) -> Self {
        let target_platform = environment.platform.clone();
        Self { paths, service, environment, target_platform }
    }
}
