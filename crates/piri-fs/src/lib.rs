//! FS-Manager: scoped filesystem mutations as a composable unit with
//! guaranteed best-effort cleanup on failure (spec §4.1).
//!
//! This is *not* a transaction — partial work can be observed; rollback
//! undoes only what the journal recorded, in reverse insertion order,
//! removing journaled files before journaled directories. Every operation
//! either records its artifact in the journal and returns success, or
//! returns an error and leaves the journal untouched.
//!
//! Callers must own their [`FsManager`] instance — it carries no internal
//! synchronization (spec §5: "no concurrency guarantees... installer uses
//! a fresh instance per procedure").

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("{path} exists and is not a symlink")]
    PathConflict { path: PathBuf },
    #[error("{} path(s) already exist: {}", .0.len(), join_paths(.0))]
    AlreadyExists(Vec<PathBuf>),
    #[error("rollback encountered {} error(s): {}", .0.len(), join_errors(.0))]
    RollbackFailed(Vec<FsError>),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

fn join_errors(errors: &[FsError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

fn io_err(path: &Path, source: io::Error) -> FsError {
    FsError::Io { path: path.to_path_buf(), source }
}

/// What a journal entry records, so rollback knows whether to remove a
/// file or a directory, and in which phase.
#[derive(Debug, Clone)]
enum JournalEntry {
    File(PathBuf),
    Directory(PathBuf),
}

/// Performs journaled filesystem mutations; `rollback()` undoes them in
/// reverse order, files first, then directories (spec §4.1).
#[derive(Debug, Default)]
pub struct FsManager {
    journal: Vec<JournalEntry>,
}

impl FsManager {
    pub fn new() -> Self {
        Self { journal: Vec::new() }
    }

    /// Idempotent: creates `path` and any missing parents. Records `path`
    /// in the journal.
    pub fn create_directory(&mut self, path: &Path, mode: u32) -> Result<(), FsError> {
        fs::create_dir_all(path).map_err(|e| io_err(path, e))?;
        set_mode(path, mode)?;
        self.journal.push(JournalEntry::Directory(path.to_path_buf()));
        Ok(())
    }

    /// Overwrite-if-exists. Records `path` in the journal.
    pub fn write_file(&mut self, path: &Path, bytes: &[u8], mode: u32) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(path, bytes).map_err(|e| io_err(path, e))?;
        set_mode(path, mode)?;
        self.journal.push(JournalEntry::File(path.to_path_buf()));
        Ok(())
    }

    /// Read-then-write. Records `dst` in the journal.
    pub fn copy_file(&mut self, src: &Path, dst: &Path, mode: u32) -> Result<(), FsError> {
        let bytes = fs::read(src).map_err(|e| io_err(src, e))?;
        self.write_file(dst, &bytes, mode)
    }

    /// If `link` exists and is a symlink, removes it first. If `link`
    /// exists and is *not* a symlink, fails with `PathConflict`.
    pub fn create_symlink(&mut self, target: &Path, link: &Path) -> Result<(), FsError> {
        if let Ok(meta) = fs::symlink_metadata(link) {
            if meta.file_type().is_symlink() {
                fs::remove_file(link).map_err(|e| io_err(link, e))?;
            } else {
                return Err(FsError::PathConflict { path: link.to_path_buf() });
            }
        }
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        symlink(target, link).map_err(|e| io_err(link, e))?;
        self.journal.push(JournalEntry::File(link.to_path_buf()));
        Ok(())
    }

    /// Reads the current target of `link` (`None` if absent), removes it,
    /// then creates a new symlink to `new_target`. If creation fails after
    /// removal, attempts to restore `old_target`. Returns the old target
    /// and a closure that re-applies the prior state when invoked.
    pub fn update_symlink_atomic(
        &mut self,
        link: &Path,
        new_target: &Path,
    ) -> Result<(Option<PathBuf>, SymlinkRollback), FsError> {
        let old_target = fs::read_link(link).ok();

        if fs::symlink_metadata(link).is_ok() {
            fs::remove_file(link).map_err(|e| io_err(link, e))?;
        }

        if let Err(create_err) = symlink(new_target, link) {
            if let Some(ref old) = old_target {
                // Best-effort restore; surface the original creation error either way.
                let _ = symlink(old, link);
            }
            return Err(io_err(link, create_err));
        }

        self.journal.push(JournalEntry::File(link.to_path_buf()));

        let rollback = SymlinkRollback { link: link.to_path_buf(), old_target: old_target.clone() };
        Ok((old_target, rollback))
    }

    /// Aggregates an error listing every path in `paths` that already
    /// exists (used by the installer's "force" gate, spec §4.4 step 1).
    pub fn check_existing_files(&self, paths: &[PathBuf]) -> Result<(), FsError> {
        let existing: Vec<PathBuf> =
            paths.iter().filter(|p| fs::symlink_metadata(p).is_ok()).cloned().collect();
        if existing.is_empty() { Ok(()) } else { Err(FsError::AlreadyExists(existing)) }
    }

    /// Recursively chowns `path` to `user` (spec §4.1 — "so the service
    /// user can read its own state").
    #[cfg(unix)]
    pub fn set_ownership(&self, path: &Path, user: &str) -> Result<(), FsError> {
        let user = nix::unistd::User::from_name(user)
            .map_err(|e| io_err(path, io::Error::other(e)))?
            .ok_or_else(|| io_err(path, io::Error::other(format!("unknown user {user:?}"))))?;
        chown_recursive(path, user.uid, user.gid)
    }

    #[cfg(not(unix))]
    pub fn set_ownership(&self, _path: &Path, _user: &str) -> Result<(), FsError> {
        Ok(())
    }

    /// Removes journaled files, then directories, in reverse insertion
    /// order. Aggregates every error encountered rather than stopping at
    /// the first; never re-raises early. Rollback never deletes items not
    /// in the journal.
    pub fn rollback(&mut self) -> Result<(), FsError> {
        let mut errors = Vec::new();

        for entry in self.journal.iter().rev() {
            if let JournalEntry::File(path) = entry
                && fs::symlink_metadata(path).is_ok()
                && let Err(e) = fs::remove_file(path)
            {
                errors.push(io_err(path, e));
            }
        }
        for entry in self.journal.iter().rev() {
            if let JournalEntry::Directory(path) = entry
                && path.exists()
            {
                // Only remove if empty — a directory with surviving
                // siblings (not all journaled) must not be torn down.
                match fs::remove_dir(path) {
                    Ok(()) => {}
                    Err(e) if is_not_empty(&e) => {}
                    Err(e) => errors.push(io_err(path, e)),
                }
            }
        }

        self.journal.clear();

        if errors.is_empty() { Ok(()) } else { Err(FsError::RollbackFailed(errors)) }
    }
}

fn is_not_empty(e: &io::Error) -> bool {
    // `DirectoryNotEmpty` is unstable as an `ErrorKind` variant on some
    // toolchains; match by raw OS error (ENOTEMPTY = 39 on Linux) too.
    e.raw_os_error() == Some(39)
}

/// A closure-like handle that restores a symlink's prior target (or prior
/// absence) when invoked (spec §4.1 `update_symlink_atomic`).
pub struct SymlinkRollback {
    link: PathBuf,
    old_target: Option<PathBuf>,
}

impl SymlinkRollback {
    pub fn apply(self) -> Result<(), FsError> {
        if fs::symlink_metadata(&self.link).is_ok() {
            fs::remove_file(&self.link).map_err(|e| io_err(&self.link, e))?;
        }
        if let Some(old) = &self.old_target {
            symlink(old, &self.link).map_err(|e| io_err(&self.link, e))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), FsError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), FsError> {
    Ok(())
}

#[cfg(unix)]
fn chown_recursive(path: &Path, uid: nix::unistd::Uid, gid: nix::unistd::Gid) -> Result<(), FsError> {
    nix::unistd::chown(path, Some(uid), Some(gid)).map_err(|e| io_err(path, io::Error::other(e)))?;
    if path.is_dir() {
        for entry in fs::read_dir(path).map_err(|e| io_err(path, e))? {
            let entry = entry.map_err(|e| io_err(path, e))?;
            chown_recursive(&entry.path(), uid, gid)?;
        }
    }
    Ok(())
}
