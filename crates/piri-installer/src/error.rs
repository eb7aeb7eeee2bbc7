use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("host platform {host} is not the installer's target {target}")]
    PlatformUnsupported { host: String, target: String },
    #[error("no supported process-supervision system detected")]
    SupervisorMissing,
    #[error("insufficient privilege to install (not root and no elevation available)")]
    NotPrivileged,
    #[error("unit {0} is still active; stop it before installing")]
    UnitStillRunning(String),
    #[error("installation is not a managed installation: {0}")]
    NotManaged(String),
    #[error(transparent)]
    Fs(#[from] piri_fs::FsError),
    #[error(transparent)]
    Service(#[from] piri_service::ServiceError),
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
    #[error(
        "restart failed after update and rollback to the previous version also failed to restart: update error: {update}; rollback error: {rollback}"
    )]
    RestartFailedAndRollbackFailed { update: String, rollback: String },
}
