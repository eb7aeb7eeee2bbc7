//! Service-Manager: a narrow, test-doubleable interface to the host
//! process-supervision system (spec §4.2).
//!
//! Every operation is funneled through [`piri_process::Executor`] — the
//! production `SystemExecutor` shells out to `systemctl`, tests supply a
//! `RecordingExecutor` with canned output keyed by argv, so the full
//! `verify_restart` algorithm can be exercised without mounting a real
//! supervisor.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use piri_process::Executor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Executor(#[from] anyhow::Error),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

type Result<T> = std::result::Result<T, ServiceError>;

/// The state `systemctl is-active` reports for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Active,
    Inactive,
    Failed,
    Activating,
    Unknown,
}

impl UnitState {
    fn from_stdout(stdout: &str) -> Self {
        match stdout.trim() {
            "active" => UnitState::Active,
            "inactive" => UnitState::Inactive,
            "failed" => UnitState::Failed,
            "activating" | "reloading" => UnitState::Activating,
            _ => UnitState::Unknown,
        }
    }
}

/// The outcome of [`ServiceManager::verify_restart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Ok,
    NotActive(String),
    TimedOut,
}

/// A unit file to install: its destination path and rendered contents.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    pub path: PathBuf,
    pub contents: String,
}

/// Drives a host supervisor (systemd) through the `Executor` seam.
pub struct ServiceManager<E: Executor> {
    executor: E,
    supervisor_cli: String,
    stabilization_window: Duration,
    poll_interval: Duration,
}

impl<E: Executor> ServiceManager<E> {
    /// Production defaults: 2-second stabilization window, 1-second poll
    /// interval, matching spec §4.2's `verify_restart` algorithm exactly.
    pub fn new(executor: E, supervisor_cli: impl Into<String>) -> Self {
        Self {
            executor,
            supervisor_cli: supervisor_cli.into(),
            stabilization_window: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Overrides the stabilization window and poll interval — used by
    /// tests so `verify_restart` doesn't block on real wall-clock time.
    pub fn with_intervals(mut self, stabilization_window: Duration, poll_interval: Duration) -> Self {
        self.stabilization_window = stabilization_window;
        self.poll_interval = poll_interval;
        self
    }

    fn argv<'a>(&'a self, args: &'a [&'a str]) -> Vec<&'a str> {
        let mut v = vec![self.supervisor_cli.as_str()];
        v.extend_from_slice(args);
        v
    }

    fn elevated_argv<'a>(&'a self, args: &'a [&'a str]) -> Vec<&'a str> {
        let mut v = vec!["sudo", self.supervisor_cli.as_str()];
        v.extend_from_slice(args);
        v
    }

    pub fn is_active(&self, unit: &str) -> Result<UnitState> {
        let argv = self.argv(&["is-active", unit]);
        let (stdout, _) = self.executor.output_status(&argv)?;
        Ok(UnitState::from_stdout(&String::from_utf8_lossy(&stdout)))
    }

    pub fn start(&self, unit: &str) -> Result<()> {
        let argv = self.argv(&["start", unit]);
        self.executor.run(&argv)?;
        Ok(())
    }

    pub fn stop(&self, unit: &str) -> Result<()> {
        let argv = self.argv(&["stop", unit]);
        // Idempotent: "unit not found" is tolerated, matching the
        // installer's failure-path stop (spec §4.4: "tolerates unit not
        // found because earlier failures may precede unit installation").
        match self.executor.run(&argv) {
            Ok(()) => Ok(()),
            Err(e) if is_unit_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn enable(&self, unit: &str) -> Result<()> {
        let argv = self.argv(&["enable", unit]);
        self.executor.run(&argv)?;
        Ok(())
    }

    pub fn disable(&self, unit: &str) -> Result<()> {
        let argv = self.argv(&["disable", unit]);
        match self.executor.run(&argv) {
            Ok(()) => Ok(()),
            Err(e) if is_unit_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn restart(&self, unit: &str) -> Result<()> {
        let argv = self.argv(&["restart", unit]);
        self.executor.run(&argv)?;
        Ok(())
    }

    pub fn restart_with_elevated_privilege(&self, unit: &str) -> Result<()> {
        let argv = self.elevated_argv(&["restart", unit]);
        self.executor.run(&argv)?;
        Ok(())
    }

    pub fn daemon_reload(&self) -> Result<()> {
        let argv = self.argv(&["daemon-reload"]);
        self.executor.run(&argv)?;
        Ok(())
    }

    /// Restarts `unit`, waits the stabilization window, then polls
    /// `is_active` every `poll_interval` up to `timeout`. Returns
    /// immediately on a `failed` report; returns `TimedOut` if the unit is
    /// neither active nor failed once `timeout` elapses (spec §4.2).
    pub fn verify_restart(&self, unit: &str, timeout: Duration, elevated: bool) -> Result<RestartOutcome> {
        if elevated {
            self.restart_with_elevated_privilege(unit)?;
        } else {
            self.restart(unit)?;
        }

        thread::sleep(self.stabilization_window);

        let deadline = Instant::now() + timeout;
        loop {
            match self.is_active(unit)? {
                UnitState::Active => return Ok(RestartOutcome::Ok),
                UnitState::Failed => {
                    return Ok(RestartOutcome::NotActive("unit reported failed".to_string()));
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Ok(RestartOutcome::TimedOut);
            }
            thread::sleep(self.poll_interval.min(deadline.saturating_duration_since(Instant::now())).max(Duration::from_millis(1)));
        }
    }

    /// `stop` then `disable`, both idempotent.
    pub fn stop_and_disable(&self, unit: &str) -> Result<()> {
        self.stop(unit)?;
        self.disable(unit)
    }

    /// Stops every unit in `units`, tolerating "not found" for each.
    pub fn stop_all(&self, units: &[&str]) -> Result<()> {
        for unit in units {
            self.stop(unit)?;
        }
        Ok(())
    }

    /// Writes each unit file descriptor to disk, then reloads the
    /// supervisor (spec §4.2 compound op).
    pub fn install_unit_files(&self, descriptors: &[UnitDescriptor]) -> Result<()> {
        for d in descriptors {
            if let Some(parent) = d.path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|source| ServiceError::Io { path: parent.to_path_buf(), source })?;
            }
            std::fs::write(&d.path, &d.contents)
                .map_err(|source| ServiceError::Io { path: d.path.clone(), source })?;
        }
        self.daemon_reload()
    }

    /// Removes unit files at `paths`. The caller is responsible for
    /// calling `daemon_reload` afterward (spec §4.2: "caller
    /// daemon_reloads").
    pub fn remove_unit_files(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if path_exists(path) {
                std::fs::remove_file(path)
                    .map_err(|source| ServiceError::Io { path: path.clone(), source })?;
            }
        }
        Ok(())
    }
}

fn path_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

fn is_unit_not_found(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("not found") || msg.contains("no such") || msg.contains("not loaded")
}
