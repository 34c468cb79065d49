//! GC PID lock.
//!
//! A file lock on `<repo>/gc.pid` is the cross-process mutex over any
//! mutation of the pack set. It is always acquired with try-lock
//! semantics: contention is an expected, non-fatal outcome that the
//! actions report as "already ongoing". The holder's PID is written into
//! the file for operators; the lock itself is the `flock`, not the
//! content.

use std::fs::OpenOptions;
use std::io::{self, Write};

use tracing::debug;

use super::file_lock::LockedFile;
use super::repo::RepoLayout;

/// Held GC PID lock. Released (and the lock file removed) on drop.
#[derive(Debug)]
pub struct GcPidLock {
    locked: Option<LockedFile>,
    path: std::path::PathBuf,
}

impl GcPidLock {
    /// Tries to acquire the repository's GC lock without blocking.
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire(layout: &RepoLayout) -> io::Result<Option<Self>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&layout.gc_lock_path)?;

        let Some(mut locked) = LockedFile::try_lock(file)? else {
            debug!(lock = %layout.gc_lock_path.display(), "gc lock held elsewhere");
            return Ok(None);
        };

        locked.set_len(0)?;
        // SAFETY: getpid has no failure modes.
        let pid = unsafe { libc::getpid() };
        writeln!(&mut *locked, "{pid}")?;
        locked.sync_all()?;

        debug!(lock = %layout.gc_lock_path.display(), pid, "gc lock acquired");
        Ok(Some(Self {
            locked: Some(locked),
            path: layout.gc_lock_path.clone(),
        }))
    }
}

impl Drop for GcPidLock {
    fn drop(&mut self) {
        // Remove the stale PID file before releasing the flock so a racing
        // acquirer never reads our PID as current.
        let _ = std::fs::remove_file(&self.path);
        self.locked.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());

        let held = GcPidLock::try_acquire(&layout).unwrap().unwrap();
        assert!(GcPidLock::try_acquire(&layout).unwrap().is_none());
        drop(held);
        assert!(GcPidLock::try_acquire(&layout).unwrap().is_some());
    }

    #[test]
    fn lock_file_records_pid_and_is_removed_on_release() {
        let dir = tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());

        let held = GcPidLock::try_acquire(&layout).unwrap().unwrap();
        let content = std::fs::read_to_string(&layout.gc_lock_path).unwrap();
        let pid: i32 = content.trim().parse().unwrap();
        assert!(pid > 0);

        drop(held);
        assert!(!layout.gc_lock_path.exists());
    }
}
