//! Host environment fingerprinting for Piri.
//!
//! The installer (`piri-installer`) needs `{os, arch}` to pick the right
//! release asset (spec §4.4 "Installer"); the Service-Manager
//! (`piri-service`) needs to know which init system it's talking to and
//! whether privilege elevation is available before it shells out to a
//! supervisor. This crate answers both questions without either crate
//! needing to know how the detection works.

use std::env;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The `{os, arch}` pair used to select a release asset and to name the
/// on-disk install directory (spec §4.4: versioned layout keyed by
/// platform triple).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// The platform this binary is currently running on.
    pub fn current() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
        }
    }

    /// The release-asset naming convention: `{os}-{arch}`, e.g. `linux-x86_64`.
    pub fn triple(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    /// The architecture token the release feed's asset names use
    /// (`amd64`/`arm64`), distinct from Rust's own `x86_64`/`aarch64`
    /// `env::consts::ARCH` spelling (spec §6 "Release feed").
    pub fn release_arch_token(&self) -> Option<&'static str> {
        match self.arch.as_str() {
            "x86_64" => Some("amd64"),
            "aarch64" | "arm64" => Some("arm64"),
            _ => None,
        }
    }

    /// The release feed's OS family grouping: Linux-family hosts publish a
    /// single `linux` asset per arch; macOS hosts publish one universal
    /// `mac_os_all` asset (spec §6).
    pub fn release_os_family(&self) -> Option<&'static str> {
        match self.os.as_str() {
            "linux" => Some("linux"),
            "macos" => Some("mac_os_all"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.triple())
    }
}

/// The init system the Service-Manager is talking to. Only `systemd` is
/// implemented by the production `SystemExecutor`-backed service manager;
/// anything else is reported so install can fail fast with a clear error
/// rather than silently no-op every service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitSystem {
    Systemd,
    Unknown,
}

impl std::fmt::Display for InitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitSystem::Systemd => write!(f, "systemd"),
            InitSystem::Unknown => write!(f, "unknown"),
        }
    }
}

/// Detects the running init system. `/run/systemd/system` existing is the
/// canonical systemd-presence check (used by systemd itself and by
/// `ps`/`deb-systemd-helper`); falling back to a `systemctl` lookup on
/// `PATH` covers containers where `/run` isn't bind-mounted.
pub fn detect_init_system() -> InitSystem {
    if std::path::Path::new("/run/systemd/system").exists() {
        return InitSystem::Systemd;
    }
    if which::which("systemctl").is_ok() {
        return InitSystem::Systemd;
    }
    InitSystem::Unknown
}

/// Whether the current process is running as root (UID 0). The installer
/// needs this to decide whether it can write to `/etc`/`/opt` directly or
/// must go through `sudo` (spec §4.4 prerequisite checks).
#[cfg(unix)]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Whether `sudo` is available for privilege elevation (spec §4.3 Service-
/// Manager "restart with elevated privilege").
pub fn supports_elevation() -> bool {
    which::which("sudo").is_ok()
}

/// A snapshot of everything the installer's prerequisite check (spec
/// §4.4 step 1) needs to evaluate before attempting an install or update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEnvironment {
    pub platform: Platform,
    pub init_system: InitSystem,
    pub is_root: bool,
    pub can_elevate: bool,
}

impl HostEnvironment {
    pub fn detect() -> Result<Self> {
        Ok(Self {
            platform: Platform::current(),
            init_system: detect_init_system(),
            is_root: is_root(),
            can_elevate: supports_elevation(),
        })
    }

    /// True when the installer can proceed without asking the operator to
    /// re-run as root or install `sudo` first.
    pub fn has_sufficient_privilege(&self) -> bool {
        self.is_root || self.can_elevate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_triple_format() {
        let p = Platform { os: "linux".to_string(), arch: "x86_64".to_string() };
        assert_eq!(p.triple(), "linux-x86_64");
        assert_eq!(p.to_string(), "linux-x86_64");
    }

    #[test]
    fn release_arch_token_maps_rust_arch_to_feed_convention() {
        let p = Platform { os: "linux".to_string(), arch: "x86_64".to_string() };
        assert_eq!(p.release_arch_token(), Some("amd64"));
        let p = Platform { os: "linux".to_string(), arch: "aarch64".to_string() };
        assert_eq!(p.release_arch_token(), Some("arm64"));
        let p = Platform { os: "linux".to_string(), arch: "mips".to_string() };
        assert_eq!(p.release_arch_token(), None);
    }

    #[test]
    fn release_os_family_maps_macos_to_universal_token() {
        let p = Platform { os: "macos".to_string(), arch: "aarch64".to_string() };
        assert_eq!(p.release_os_family(), Some("mac_os_all"));
        let p = Platform { os: "windows".to_string(), arch: "x86_64".to_string() };
        assert_eq!(p.release_os_family(), None);
    }

    #[test]
    fn platform_current_is_non_empty() {
        let p = Platform::current();
        assert!(!p.os.is_empty());
        assert!(!p.arch.is_empty());
    }

    #[test]
    fn init_system_display() {
        assert_eq!(InitSystem::Systemd.to_string(), "systemd");
        assert_eq!(InitSystem::Unknown.to_string(), "unknown");
    }

    #[test]
    fn detect_init_system_runs() {
        let _ = detect_init_system();
    }

    #[test]
    fn host_environment_detect_runs() {
        let env = HostEnvironment::detect().expect("detect");
        assert!(!env.platform.os.is_empty());
    }

    #[test]
    fn has_sufficient_privilege_true_when_root() {
        let env = HostEnvironment {
            platform: Platform::current(),
            init_system: InitSystem::Systemd,
            is_root: true,
            can_elevate: false,
        };
        assert!(env.has_sufficient_privilege());
    }

    #[test]
    fn has_sufficient_privilege_false_when_neither() {
        let env = HostEnvironment {
            platform: Platform::current(),
            init_system: InitSystem::Unknown,
            is_root: false,
            can_elevate: false,
        };
        assert!(!env.has_sufficient_privilege());
    }
}
