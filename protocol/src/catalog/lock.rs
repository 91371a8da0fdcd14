//! Advisory file lock guarding the catalog document.
//!
//! The lock is an OS advisory lock (`flock` / `LockFileEx` via `fs2`) on a
//! sibling file, `<catalog>.lock`. The kernel owns exclusion: a holder that
//! exits, cleanly or not, releases the lock with its file handle, so a dead
//! writer can never wedge the catalog.
//!
//! The file itself is never deleted, since unlinking a locked inode lets a
//! late waiter and a fresh creator both win. It carries a JSON record of
//! the current holder (pid, creation time) and is truncated on release. A
//! record still present at acquisition means the previous holder exited
//! without releasing; a record older than `stale_after` while the lock is
//! still held means a live holder is stuck, which is reported but not
//! broken. Contention is retried with exponential backoff until `timeout`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LOCK_INITIAL_BACKOFF, LOCK_MAX_BACKOFF, LOCK_SUFFIX};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockRecord {
    pid: u32,
    created_at: DateTime<Utc>,
}

impl LockRecord {
    fn read(path: &Path) -> Option<Self> {
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, PathBuf),

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held lock. Dropping it clears the holder record and releases the lock.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Lock path for a guarded file.
    pub fn path_for(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_os_string();
        name.push(LOCK_SUFFIX);
        PathBuf::from(name)
    }

    /// Acquire the lock for `target`, blocking the current thread.
    pub fn acquire(target: &Path, timeout: Duration, stale_after: Duration) -> Result<Self, LockError> {
        let path = Self::path_for(target);
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => return Err(LockError::Io { path, source }),
        };

        let deadline = Instant::now() + timeout;
        let mut backoff = LOCK_INITIAL_BACKOFF;
        let mut reported_stuck = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Self::claim(path, file),
                Err(e) if is_contended(&e) => {}
                Err(source) => return Err(LockError::Io { path, source }),
            }

            if !reported_stuck {
                if let Some(holder) = LockRecord::read(&path) {
                    if held_longer_than(&holder, stale_after) {
                        warn!(
                            path = %path.display(),
                            holder_pid = holder.pid,
                            since = %holder.created_at,
                            "catalog lock held past stale threshold"
                        );
                        reported_stuck = true;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout(timeout, path));
            }
            thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(LOCK_MAX_BACKOFF);
        }
    }

    fn claim(path: PathBuf, mut file: File) -> Result<Self, LockError> {
        if let Some(previous) = LockRecord::read(&path) {
            warn!(
                path = %path.display(),
                previous_pid = previous.pid,
                since = %previous.created_at,
                "recovered catalog lock from a holder that exited without releasing"
            );
        }

        let record = LockRecord {
            pid: std::process::id(),
            created_at: Utc::now(),
        };
        if let Err(source) = write_record(&mut file, &record) {
            // Closing the handle releases the kernel lock.
            return Err(LockError::Io { path, source });
        }
        debug!(path = %path.display(), "catalog lock acquired");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Clear the record first: it must be empty by the time the next
        // holder looks at it.
        if let Err(e) = self.file.set_len(0) {
            warn!(path = %self.path.display(), error = %e, "failed to clear catalog lock record");
        }
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release catalog lock");
        }
    }
}

fn write_record(file: &mut File, record: &LockRecord) -> io::Result<()> {
    let body = serde_json::to_vec(record).map_err(io::Error::from)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&body)?;
    file.sync_all()
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn held_longer_than(record: &LockRecord, stale_after: Duration) -> bool {
    Utc::now()
        .signed_duration_since(record.created_at)
        .to_std()
        .map_or(false, |age| age > stale_after)
}
