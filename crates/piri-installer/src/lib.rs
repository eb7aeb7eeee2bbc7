//! Installer/Updater: the install, managed-update, and uninstall state
//! machines that take Piri from "binary and config" to "running, supervised
//! service" and back (spec §4.4).
//!
//! Every procedure here is built on three narrower seams owned by sibling
//! crates: [`piri_fs::FsManager`] for journaled, rollback-capable filesystem
//! mutations, [`piri_service::ServiceManager`] for supervisor interaction,
//! and [`piri_release::ReleaseClient`] for fetching and verifying upstream
//! releases. This crate's job is sequencing those primitives into the
//! exact state machines the spec describes and translating their failures
//! into rollback.

mod context;
mod error;
mod install;
mod paths;
mod prereqs;
mod status;
mod unit;
mod uninstall;
mod update;

pub use context::InstallContext;
pub use error::InstallerError;
pub use install::{InstallRequest, install};
pub use paths::PathConfig;
pub use prereqs::{check_install_prereqs, check_update_prereqs};
pub use status::{HttpNodeStatusClient, NodeStatus, NodeStatusClient};
pub use uninstall::uninstall;
pub use unit::{UnitFile, UnitRenderer};
pub use update::{UpdateOutcome, UpdateRequest, run_managed_update};
