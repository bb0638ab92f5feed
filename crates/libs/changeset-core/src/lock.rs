//! Atomic lock manager (spec §4.2). The synchronization primitive the
//! change lifecycle layers policy on top of: exclusive-create rename makes
//! acquisition atomic with respect to the filesystem, so at most one of N
//! concurrent acquirers ever succeeds.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorCode, Result, WorkflowError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    pub owner: String,
    pub since: i64,
    pub ttl: i64,
}

impl LockInfo {
    pub fn is_stale(&self, now: i64) -> bool {
        now >= self.since.saturating_add(self.ttl)
    }

    pub fn expires_at(&self) -> i64 {
        self.since.saturating_add(self.ttl)
    }
}

pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Acquire (or reclaim) an exclusive lock at `path`.
///
/// Algorithm (spec §4.2):
/// 1. validate inputs
/// 2. write a temp file sibling to `path` with owner-only mode, fsync, then
///    rename over `path` only if it doesn't exist (`create_new`)
/// 3. on conflict, read the existing lock; if unparseable, retry as absent
/// 4. if live, fail `ELOCKED`; if stale, reclaim (rewrite + renormalize mode)
pub fn atomic_lock(path: &Path, owner: &str, ttl: i64) -> Result<LockInfo> {
    if ttl <= 0 {
        return Err(WorkflowError::new(ErrorCode::InvalidInput, "ttl must be positive"));
    }
    if owner.is_empty() {
        return Err(WorkflowError::new(ErrorCode::InvalidInput, "owner must not be empty"));
    }

    let info = LockInfo {
        owner: owner.to_string(),
        since: now_epoch_secs(),
        ttl,
    };
    try_create(path, &info)
}

fn try_create(path: &Path, info: &LockInfo) -> Result<LockInfo> {
    loop {
        match write_new_lock(path, info) {
            Ok(()) => return Ok(info.clone()),
            Err(WriteNewLockError::AlreadyExists) => {
                match fs::read_to_string(path) {
                    Ok(existing_raw) => match serde_json::from_str::<LockInfo>(&existing_raw) {
                        Ok(existing) => {
                            let now = now_epoch_secs();
                            if existing.is_stale(now) {
                                // Reclaim: overwrite unconditionally, then renormalize perms.
                                reclaim(path, info)?;
                                return Ok(info.clone());
                            }
                            return Err(WorkflowError::locked(
                                path_slug(path),
                                &existing.owner,
                                existing.expires_at() - now,
                            ));
                        }
                        Err(_) => {
                            // Unparseable: treat as absent, remove and retry.
                            let _ = fs::remove_file(path);
                            continue;
                        }
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(WorkflowError::io(e)),
                }
            }
            Err(WriteNewLockError::Io(e)) => return Err(WorkflowError::io(e)),
        }
    }
}

enum WriteNewLockError {
    AlreadyExists,
    Io(std::io::Error),
}

fn write_new_lock(path: &Path, info: &LockInfo) -> std::result::Result<(), WriteNewLockError> {
    let tmp_path = sibling_tmp_path(path);
    let json = serde_json::to_vec(info).map_err(|e| {
        WriteNewLockError::Io(std::io::Error::other(e))
    })?;

    write_owner_only(&tmp_path, &json).map_err(WriteNewLockError::Io)?;

    match fs::rename_exclusive(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                Err(WriteNewLockError::AlreadyExists)
            } else {
                Err(WriteNewLockError::Io(e))
            }
        }
    }
}

/// Unconditionally overwrite the lock at `path` with a fresh `since`/`ttl`
/// for `owner`. Callers must have already established that `owner` holds
/// the current live lock (the change lifecycle's same-owner reopen path) —
/// unlike `atomic_lock`, this does not itself re-check ownership or
/// liveness, since it exists precisely to bypass `atomic_lock`'s "live
/// lock blocks everyone" rule for the lock's own owner.
pub fn refresh(path: &Path, owner: &str, ttl: i64) -> Result<LockInfo> {
    let info = LockInfo { owner: owner.to_string(), since: now_epoch_secs(), ttl };
    reclaim(path, &info)?;
    Ok(info)
}

fn reclaim(path: &Path, info: &LockInfo) -> Result<()> {
    let tmp_path = sibling_tmp_path(path);
    let json = serde_json::to_vec(info).map_err(WorkflowError::io)?;
    write_owner_only(&tmp_path, &json)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        WorkflowError::io(e)
    })?;
    normalize_mode(path)?;
    Ok(())
}

fn write_owner_only(path: &Path, content: &[u8]) -> std::result::Result<(), std::io::Error> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut f = opts.open(path)?;
    f.write_all(content)?;
    f.sync_all()?;
    normalize_mode(path)?;
    Ok(())
}

#[cfg(unix)]
fn normalize_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms).map_err(WorkflowError::io)
}

#[cfg(not(unix))]
fn normalize_mode(_path: &Path) -> Result<()> {
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".lock-{}.tmp", Uuid::new_v4()))
}

fn path_slug(path: &Path) -> &str {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
}

/// Release a lock iff it's owned by `owner`.
pub fn release(path: &Path, owner: &str) -> Result<()> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            if let Ok(existing) = serde_json::from_str::<LockInfo>(&raw) {
                if existing.owner != owner {
                    // Not ours: no-op, matches fail-fast semantics elsewhere.
                    return Ok(());
                }
            }
            fs::remove_file(path).map_err(WorkflowError::io)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkflowError::io(e)),
    }
}

/// Read the current lock, if any. Returns `None` for a missing or
/// unparseable lock file (an unparseable lock is treated as absent,
/// matching `atomic_lock`'s retry-as-absent behavior).
pub fn inspect(path: &Path) -> Option<LockInfo> {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<LockInfo>(&raw).ok())
}

/// `std::fs::rename` does not offer an exclusive-create guarantee on its
/// own (it can silently replace an existing destination). This trait-free
/// helper implements "rename iff destination absent" via a hardlink +
/// unlink on Unix (`link` fails if the destination exists, which is
/// exactly the atomicity primitive the spec calls for); elsewhere it
/// falls back to a create_new file copy, which is still atomic per-OS but
/// loses the fsync-before-rename ordering of the Unix path.
mod fs {
    use std::io;
    use std::path::Path;

    pub use std::fs::*;

    pub fn rename_exclusive(from: &Path, to: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::fs::hard_link(from, to)?;
            std::fs::remove_file(from)?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            // No atomic link-without-replace primitive in std for non-Unix;
            // approximate with create_new then copy contents + remove tmp.
            let content = std::fs::read(from)?;
            let mut opts = std::fs::OpenOptions::new();
            opts.write(true).create_new(true);
            use std::io::Write;
            let mut f = opts.open(to)?;
            f.write_all(&content)?;
            f.sync_all()?;
            std::fs::remove_file(from)?;
            Ok(())
        }
    }
}
