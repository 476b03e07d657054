//! Cross-process lease on the local database file.
//!
//! [`ProcessingLock`](super::ProcessingLock) only sees pipelines of one
//! engine. A second process on the same database (a CLI `sync` while the
//! daemon runs) is kept out by a lease file next to the database, holding
//! the owner's pid and pipeline. A lease whose owner is gone, or that is
//! older than [`LEASE_STALE_AFTER_MINUTES`], is taken over.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::events::Pipeline;
use crate::error::{Error, Result};

pub const LEASE_STALE_AFTER_MINUTES: i64 = 30;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseInfo {
    pid: u32,
    pipeline: Pipeline,
    acquired_at: DateTime<Utc>,
}

impl LeaseInfo {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        !pid_is_alive(self.pid)
            || now - self.acquired_at > Duration::minutes(LEASE_STALE_AFTER_MINUTES)
    }
}

/// Held for one pipeline run; the lease file is removed on drop
#[derive(Debug)]
pub struct PipelineLease {
    path: PathBuf,
}

impl PipelineLease {
    /// `<db file>.lock`
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lease for `pipeline`, or fail with [`Error::LockRejected`]
    /// naming the current holder.
    pub fn acquire(db_path: &Path, pipeline: Pipeline) -> Result<Self> {
        let path = Self::path_for(db_path);
        let info = LeaseInfo {
            pid: std::process::id(),
            pipeline,
            acquired_at: Utc::now(),
        };

        if !publish(&path, &info)? {
            clear_if_stale(&path, info.acquired_at)?;
            if !publish(&path, &info)? {
                return Err(held_by(&path));
            }
        }

        tracing::debug!(path = %path.display(), pipeline = %pipeline, "Pipeline lease acquired");
        Ok(Self { path })
    }
}

impl Drop for PipelineLease {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            if error.kind() != IoErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    "Failed to release pipeline lease: {error}"
                );
            }
        }
    }
}

/// Create the lease file with its full contents in one step; false when
/// another lease already exists.
fn publish(path: &Path, info: &LeaseInfo) -> Result<bool> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(format!(
        ".{}.{}",
        info.pid,
        STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let staging = PathBuf::from(staging);

    fs::write(&staging, serde_json::to_vec(info)?)?;
    let linked = fs::hard_link(&staging, path);
    if let Err(error) = fs::remove_file(&staging) {
        tracing::debug!(path = %staging.display(), "Failed to remove staged lease: {error}");
    }

    match linked {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == IoErrorKind::AlreadyExists => Ok(false),
        Err(error) => Err(error.into()),
    }
}

/// Remove an abandoned or unreadable lease. The file is only removed if it
/// still holds what was read, so a lease published meanwhile survives.
fn clear_if_stale(path: &Path, now: DateTime<Utc>) -> Result<()> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == IoErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error.into()),
    };

    match serde_json::from_str::<LeaseInfo>(&contents) {
        Ok(holder) if !holder.is_stale(now) => return Ok(()),
        Ok(holder) => tracing::warn!(
            pid = holder.pid,
            pipeline = %holder.pipeline,
            since = %holder.acquired_at,
            "Taking over stale pipeline lease"
        ),
        Err(_) => tracing::warn!(path = %path.display(), "Replacing unreadable pipeline lease"),
    }

    if fs::read_to_string(path).ok().as_deref() == Some(contents.as_str()) {
        if let Err(error) = fs::remove_file(path) {
            if error.kind() != IoErrorKind::NotFound {
                return Err(error.into());
            }
        }
    }
    Ok(())
}

fn held_by(path: &Path) -> Error {
    let active = fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<LeaseInfo>(&contents).ok())
        .map_or_else(
            || "another process".to_string(),
            |holder| format!("{} in process {}", holder.pipeline, holder.pid),
        );
    Error::LockRejected { active }
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}
