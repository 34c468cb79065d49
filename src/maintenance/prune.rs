//! Prune outdated packs (legacy last-two retention).
//!
//! The predecessor of the preserve pass: instead of a time-based grace
//! window it keeps a fixed "second-to-last plus last" window over the pack
//! log. The last entry stays untouched, the second-to-last triple is moved
//! to `preserved/`, and every earlier entry's triple is deleted from both
//! the pack directory and `preserved/`. The rewritten log contains exactly
//! the retained window, in log order.
//!
//! Snapshot handling, locking, and rename rules are identical to the
//! preserve pass.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use super::errors::PreserveError;
use super::fs_util;
use super::object_id::{PackExt, PackId};
use super::pack_log::PackLog;
use super::repo::RepoLayout;

/// Outcome of one prune pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneSummary {
    /// True when a snapshot existed and was processed.
    pub snapshot_processed: bool,
    /// Pack files moved or deleted.
    pub processed_files: u64,
}

/// Applies the last-two retention window to the pack log.
pub struct PruneOrchestrator<'a> {
    layout: &'a RepoLayout,
}

impl<'a> PruneOrchestrator<'a> {
    /// Creates an orchestrator over a repository layout.
    #[must_use]
    pub fn new(layout: &'a RepoLayout) -> Self {
        Self { layout }
    }

    /// Runs one prune pass. The caller holds the GC PID lock.
    pub fn prune_outdated(&self) -> Result<PruneSummary, PreserveError> {
        let log = PackLog::new(&self.layout.pack_dir);

        let Some(snapshot_path) = log.snapshot()? else {
            info!(repo = %self.layout.repo_dir.display(), "no packs to prune");
            return Ok(PruneSummary::default());
        };

        let preserved_dir = self.layout.ensure_preserved_dir()?.to_path_buf();
        let entries = PackLog::read_all(&snapshot_path)?;

        let mut processed_files = 0u64;
        if !entries.is_empty() {
            let last = entries.len() - 1;
            for (index, id) in entries.iter().enumerate() {
                if index == last {
                    continue;
                }
                if index + 1 == last {
                    processed_files +=
                        move_triple(id, &self.layout.pack_dir, &preserved_dir)?;
                } else {
                    processed_files += delete_triple(id, &self.layout.pack_dir)?;
                    processed_files += delete_triple(id, &preserved_dir)?;
                }
            }
        }

        info!(
            repo = %self.layout.repo_dir.display(),
            processed_files,
            "prune pass processed pack log"
        );

        remove_if_exists(&snapshot_path)?;
        if !entries.is_empty() {
            let window_start = entries.len().saturating_sub(2);
            log.rewrite(&entries[window_start..])?;
        }

        Ok(PruneSummary {
            snapshot_processed: true,
            processed_files,
        })
    }
}

fn move_triple(id: &PackId, pack_dir: &Path, preserved_dir: &Path) -> Result<u64, PreserveError> {
    let mut moved = 0;
    for ext in PackExt::TRIPLE {
        let name = id.file_name(ext);
        if fs_util::move_if_exists(&pack_dir.join(&name), &preserved_dir.join(&name))? {
            moved += 1;
        }
    }
    Ok(moved)
}

fn delete_triple(id: &PackId, dir: &Path) -> Result<u64, PreserveError> {
    let mut deleted = 0;
    for ext in PackExt::TRIPLE {
        match fs::remove_file(id.file_path(dir, ext)) {
            Ok(()) => deleted += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(deleted)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
