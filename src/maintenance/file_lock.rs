//! Exclusive file locks over `flock(2)`.
//!
//! All pack log operations, including reads, run under an exclusive lock on
//! the log file so readers cannot race a writer. The GC PID lock uses the
//! non-blocking variant. Locks are advisory and per open file description:
//! two handles from separate `open` calls conflict even within one process,
//! which is what the tests rely on.
//!
//! # Invariants
//! - The lock is released on drop along every exit path.
//! - A guard wraps the locked `File`; the file cannot outlive its lock.

use std::fs::File;
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::io::AsRawFd;

/// An exclusively locked file. Unlocks on drop.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Acquires an exclusive lock, blocking until it is available.
    pub fn lock(file: File) -> io::Result<Self> {
        flock(&file, libc::LOCK_EX)?;
        Ok(Self { file })
    }

    /// Tries to acquire an exclusive lock without blocking.
    ///
    /// Returns `Ok(None)` if another holder has the lock.
    pub fn try_lock(file: File) -> io::Result<Option<Self>> {
        match flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(Some(Self { file })),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

}

impl Deref for LockedFile {
    type Target = File;

    fn deref(&self) -> &File {
        &self.file
    }
}

impl DerefMut for LockedFile {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = flock(&self.file, libc::LOCK_UN);
    }
}

fn flock(file: &File, op: libc::c_int) -> io::Result<()> {
    // SAFETY: the fd is valid for the lifetime of `file`.
    let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
