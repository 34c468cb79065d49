//! Append-only binary log of generated packs (the pack log).
//!
//! The log records the identity of every pack published by bitmap
//! generation, in publish order. It is a flat sequence of 20-byte records
//! with no header, separators, or padding; the record count is always
//! `size / 20`, and any other size is corruption. A zero-length file is
//! valid and means "no packs tracked".
//!
//! Every operation — including reads — takes an exclusive `flock` on the
//! log file so concurrent maintenance processes serialize. Appends are
//! deduplicated against the existing records and fsynced before the lock
//! is released, so the lock scope is the durability transaction: either
//! all new ids land or none do.
//!
//! # Invariants
//! - `size % 20 == 0`; violations are rejected with [`PackLogError::Corrupt`].
//! - No duplicate records (enforced on append).
//! - Record order is publish order; rewrites only drop records, never
//!   permute them.
//! - The snapshot rename happens under the same exclusive lock, so no
//!   append can target the renamed file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashSet;
use tracing::{debug, info};

use super::errors::PackLogError;
use super::file_lock::LockedFile;
use super::fs_util;
use super::object_id::{PackId, ID_RAW_LEN};

/// File name of the live log inside the pack directory.
pub const LOG_FILE_NAME: &str = ".ghs-packs.log";

/// Outcome of an append.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendStats {
    /// Records written by this append.
    pub appended: usize,
    /// Ids skipped because they were already present.
    pub skipped: usize,
}

/// Handle to a repository's pack log.
#[derive(Clone, Debug)]
pub struct PackLog {
    pack_dir: PathBuf,
}

impl PackLog {
    /// Creates a handle for the log inside `pack_dir`.
    #[must_use]
    pub fn new(pack_dir: &Path) -> Self {
        Self {
            pack_dir: pack_dir.to_path_buf(),
        }
    }

    /// Returns the live log path.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.pack_dir.join(LOG_FILE_NAME)
    }

    /// Appends `ids` in order, skipping ids already present.
    ///
    /// Runs under the exclusive log lock; the file is fsynced before the
    /// lock is released.
    pub fn append(&self, ids: &[PackId]) -> Result<AppendStats, PackLogError> {
        let path = self.log_path();
        let mut locked = LockedFile::lock(open_log(&path, true)?)?;

        let existing = read_records(&mut locked, &path)?;
        let mut seen: AHashSet<PackId> = existing.into_iter().collect();

        let mut stats = AppendStats::default();
        locked.seek(SeekFrom::End(0))?;
        for id in ids {
            if seen.insert(*id) {
                debug!(pack = %id, "adding pack to {LOG_FILE_NAME}");
                locked.write_all(id.raw())?;
                stats.appended += 1;
            } else {
                info!(pack = %id, "{LOG_FILE_NAME} already contains pack, skipping");
                stats.skipped += 1;
            }
        }

        fs_util::sync_file(&locked)?;
        Ok(stats)
    }

    /// Reads all records from `path` in file order, first occurrence wins.
    ///
    /// The file is created empty if it does not exist, and the read runs
    /// under the exclusive lock so it cannot observe a half-written append.
    pub fn read_all(path: &Path) -> Result<Vec<PackId>, PackLogError> {
        let mut locked = LockedFile::lock(open_log(path, true)?)?;
        let records = read_records(&mut locked, path)?;

        let mut seen: AHashSet<PackId> = AHashSet::with_capacity(records.len());
        let mut ordered = Vec::with_capacity(records.len());
        for id in records {
            if seen.insert(id) {
                ordered.push(id);
            }
        }
        Ok(ordered)
    }

    /// Atomically renames the live log to a timestamped snapshot.
    ///
    /// Returns `None` when there is no live log. Appends that race this
    /// call either land before the rename (and travel with the snapshot)
    /// or recreate a fresh live log afterwards.
    pub fn snapshot(&self) -> Result<Option<PathBuf>, PackLogError> {
        let path = self.log_path();
        if !path.exists() {
            info!(log = %path.display(), "no pack log found, skipping snapshot");
            return Ok(None);
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let snapshot_path = self.pack_dir.join(format!("packs.log.{millis}.snapshot"));

        let _locked = LockedFile::lock(open_log(&path, false)?)?;
        fs_util::move_file(&path, &snapshot_path)?;
        Ok(Some(snapshot_path))
    }

    /// Rewrites the live log to contain exactly `keep`, in the given order.
    ///
    /// The replacement is staged in a sibling temp file, fsynced, and
    /// renamed over the live log while the live log's lock is held, so
    /// concurrent appends serialize behind the rewrite.
    pub fn rewrite(&self, keep: &[PackId]) -> Result<(), PackLogError> {
        let mut staged = tempfile::Builder::new()
            .prefix(".ghs-packs.")
            .suffix(".tmp")
            .tempfile_in(&self.pack_dir)?;
        for id in keep {
            staged.write_all(id.raw())?;
        }
        fs_util::sync_file(staged.as_file())?;

        let path = self.log_path();
        let _locked = LockedFile::lock(open_log(&path, true)?)?;
        staged
            .persist(&path)
            .map_err(|err| PackLogError::Io(err.error))?;
        Ok(())
    }

    /// Removes the live log if present.
    pub fn delete(&self) -> Result<(), PackLogError> {
        match std::fs::remove_file(self.log_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn open_log(path: &Path, create: bool) -> Result<File, PackLogError> {
    Ok(OpenOptions::new()
        .create(create)
        .read(true)
        .write(true)
        .open(path)?)
}

/// Reads every record from the locked file, enforcing the record width.
fn read_records(file: &mut File, path: &Path) -> Result<Vec<PackId>, PackLogError> {
    let size = file.metadata()?.len();
    if size % ID_RAW_LEN as u64 != 0 {
        return Err(PackLogError::Corrupt {
            path: path.to_path_buf(),
            detail: format!("size {size} not multiple of {ID_RAW_LEN}"),
        });
    }

    file.seek(SeekFrom::Start(0))?;
    let mut data = Vec::with_capacity(size as usize);
    file.read_to_end(&mut data)?;
    if data.len() as u64 != size {
        return Err(PackLogError::Corrupt {
            path: path.to_path_buf(),
            detail: "unexpected EOF inside a record".to_string(),
        });
    }

    let mut ids = Vec::with_capacity(data.len() / ID_RAW_LEN);
    for chunk in data.chunks_exact(ID_RAW_LEN) {
        // chunks_exact guarantees the width; try_from_slice cannot fail.
        if let Some(id) = PackId::try_from_slice(chunk) {
            ids.push(id);
        }
    }
    Ok(ids)
}
