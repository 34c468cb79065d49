//! Preserve outdated packs (superseded-bitmap aging).
//!
//! Once a newer bitmap supersedes a pack, clients may still hold references
//! into the old bitmap, so outdated packs are moved to
//! `objects/pack/preserved/` instead of being deleted. A pack is only
//! preserved after it has aged past the `gc.prunePackExpire` grace window;
//! the pack carrying the most recent bitmap is never preserved.
//!
//! # Protocol
//! 1. Snapshot the live pack log (atomic rename); no snapshot means no
//!    work.
//! 2. Read the snapshot and decide per id: keep (most recent bitmap, or
//!    not yet expired) or preserve (move the pack/idx/bitmap triple).
//! 3. Delete the snapshot, then rewrite the live log from the keep set —
//!    or delete it when nothing is kept.
//!
//! Moves are individual, not transactional; missing sources are tolerated
//! so a rerun after a partial failure converges. The caller holds the GC
//! PID lock for the duration.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, info};

use super::errors::PreserveError;
use super::expire::{resolve_expire, ExpireCutoff};
use super::fs_util;
use super::object_id::{PackExt, PackId};
use super::pack_log::PackLog;
use super::repository::{Repository, CONFIG_PRUNE_PACK_EXPIRE};

/// Outcome of one preserve pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreserveSummary {
    /// True when a snapshot existed and was processed.
    pub snapshot_processed: bool,
    /// Pack files moved into `preserved/`.
    pub moved_files: u64,
    /// Ids retained in the rewritten log.
    pub kept: usize,
}

/// Moves superseded packs into `preserved/` and rewrites the pack log.
pub struct Preserver<'a> {
    repo: &'a dyn Repository,
}

impl<'a> Preserver<'a> {
    /// Creates a preserver over `repo`.
    #[must_use]
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo }
    }

    /// Runs one preserve pass. The caller holds the GC PID lock.
    pub fn preserve_outdated(&self) -> Result<PreserveSummary, PreserveError> {
        let layout = self.repo.layout();
        let log = PackLog::new(&layout.pack_dir);

        let Some(snapshot_path) = log.snapshot()? else {
            info!(repo = %layout.repo_dir.display(), "no packs to preserve");
            return Ok(PreserveSummary::default());
        };

        let preserved_dir = layout.ensure_preserved_dir()?.to_path_buf();
        let entries = PackLog::read_all(&snapshot_path)?;

        let most_recent_bitmap = most_recent_existing_bitmap(&layout.pack_dir)?;
        let cutoff = resolve_expire(
            self.repo
                .config_get(CONFIG_PRUNE_PACK_EXPIRE)?
                .as_deref(),
            SystemTime::now(),
        );

        let mut kept: Vec<PackId> = Vec::new();
        let mut moved_files = 0u64;
        for id in &entries {
            if self.retain(id, most_recent_bitmap.as_deref(), cutoff, &layout.pack_dir) {
                kept.push(*id);
                continue;
            }
            for ext in PackExt::TRIPLE {
                let name = id.file_name(ext);
                let source = layout.pack_dir.join(&name);
                let target = preserved_dir.join(&name);
                if fs_util::move_if_exists(&source, &target)? {
                    moved_files += 1;
                }
            }
        }

        info!(
            repo = %layout.repo_dir.display(),
            moved_files,
            kept = kept.len(),
            "preserve pass processed pack log"
        );

        remove_if_exists(&snapshot_path)?;
        if kept.is_empty() {
            log.delete()?;
        } else {
            log.rewrite(&kept)?;
        }

        Ok(PreserveSummary {
            snapshot_processed: true,
            moved_files,
            kept: kept.len(),
        })
    }

    /// True when `id` must stay active: it owns the most recent bitmap, or
    /// its pack has not yet aged past the grace window.
    fn retain(
        &self,
        id: &PackId,
        most_recent_bitmap: Option<&str>,
        cutoff: ExpireCutoff,
        pack_dir: &Path,
    ) -> bool {
        if most_recent_bitmap == Some(id.file_name(PackExt::Bitmap).as_str()) {
            debug!(pack = %id, "retained, owns the most recent bitmap");
            return true;
        }
        let fresh = fs::metadata(id.file_path(pack_dir, PackExt::Pack))
            .and_then(|meta| meta.modified())
            .map(|mtime| !cutoff.is_stale(mtime))
            .unwrap_or(false);
        if fresh {
            debug!(pack = %id, "retained, not yet past the grace window");
        }
        fresh
    }
}

/// Returns the file name of the `pack-*.bitmap` in `pack_dir` with the
/// greatest mtime, ties broken by name.
pub fn most_recent_existing_bitmap(pack_dir: &Path) -> io::Result<Option<String>> {
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    let mut best: Option<(SystemTime, String)> = None;
    for entry in entries {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if !name.starts_with("pack-") || !name.ends_with(".bitmap") {
            continue;
        }
        let mtime = entry.metadata()?.modified()?;
        let candidate = (mtime, name);
        if best.as_ref().map_or(true, |b| *b < candidate) {
            best = Some(candidate);
        }
    }
    Ok(best.map(|(_, name)| name))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::object_id::ID_RAW_LEN;
    use crate::maintenance::test_support::FakeRepository;
    use std::time::Duration;
    use tempfile::tempdir;

    fn id(byte: u8) -> PackId {
        PackId::from_raw([byte; ID_RAW_LEN])
    }

    /// Creates a pack triple with the given mtime; returns the repo's pack dir.
    fn seed_triple(pack_dir: &Path, id: PackId, mtime: SystemTime) {
        fs::create_dir_all(pack_dir).unwrap();
        for ext in PackExt::TRIPLE {
            let path = id.file_path(pack_dir, ext);
            fs::write(&path, id.raw()).unwrap();
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }
    }

    fn triple_in(dir: &Path, id: PackId) -> bool {
        PackExt::TRIPLE.iter().all(|&ext| id.file_path(dir, ext).is_file())
    }

    #[test]
    fn no_log_is_a_no_op() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path());

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert_eq!(summary, PreserveSummary::default());
        assert!(!repo.layout().preserved_dir.exists());
    }

    #[test]
    fn older_pack_is_preserved_and_newest_kept() {
        let dir = tempdir().unwrap();
        let repo =
            FakeRepository::new(dir.path()).with_config(CONFIG_PRUNE_PACK_EXPIRE, "now");
        let layout = repo.layout().clone();

        let now = SystemTime::now();
        seed_triple(&layout.pack_dir, id(1), now - Duration::from_secs(60));
        seed_triple(&layout.pack_dir, id(2), now);
        let log = PackLog::new(&layout.pack_dir);
        log.append(&[id(1), id(2)]).unwrap();

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert!(summary.snapshot_processed);
        assert_eq!(summary.moved_files, 3);

        assert!(triple_in(&layout.preserved_dir, id(1)));
        assert!(!id(1).file_path(&layout.pack_dir, PackExt::Pack).exists());
        assert!(triple_in(&layout.pack_dir, id(2)));
        assert_eq!(PackLog::read_all(&log.log_path()).unwrap(), vec![id(2)]);
    }

    #[test]
    fn grace_window_retains_fresh_packs() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path())
            .with_config(CONFIG_PRUNE_PACK_EXPIRE, "10.seconds.ago");
        let layout = repo.layout().clone();

        let now = SystemTime::now();
        seed_triple(&layout.pack_dir, id(1), now - Duration::from_secs(5));
        seed_triple(&layout.pack_dir, id(2), now);
        let log = PackLog::new(&layout.pack_dir);
        log.append(&[id(1), id(2)]).unwrap();

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert_eq!(summary.moved_files, 0);
        assert!(triple_in(&layout.pack_dir, id(1)));
        assert_eq!(
            PackLog::read_all(&log.log_path()).unwrap(),
            vec![id(1), id(2)]
        );

        // Age the older pack past the window and rerun.
        for ext in PackExt::TRIPLE {
            fs::File::options()
                .write(true)
                .open(id(1).file_path(&layout.pack_dir, ext))
                .unwrap()
                .set_modified(now - Duration::from_secs(11))
                .unwrap();
        }
        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert_eq!(summary.moved_files, 3);
        assert!(triple_in(&layout.preserved_dir, id(1)));
        assert_eq!(PackLog::read_all(&log.log_path()).unwrap(), vec![id(2)]);
    }

    #[test]
    fn most_recent_bitmap_is_kept_even_mid_log() {
        let dir = tempdir().unwrap();
        let repo =
            FakeRepository::new(dir.path()).with_config(CONFIG_PRUNE_PACK_EXPIRE, "now");
        let layout = repo.layout().clone();

        seed_triple(&layout.pack_dir, id(0x4d), SystemTime::now());
        let log = PackLog::new(&layout.pack_dir);
        log.append(&[id(0x0a), id(0x4d), id(0x0b)]).unwrap();

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert_eq!(summary.moved_files, 0);
        assert_eq!(summary.kept, 1);
        assert!(triple_in(&layout.pack_dir, id(0x4d)));
        assert_eq!(PackLog::read_all(&log.log_path()).unwrap(), vec![id(0x4d)]);
    }

    #[test]
    fn reapplying_without_progress_is_idempotent() {
        let dir = tempdir().unwrap();
        let repo =
            FakeRepository::new(dir.path()).with_config(CONFIG_PRUNE_PACK_EXPIRE, "now");
        let layout = repo.layout().clone();

        let now = SystemTime::now();
        seed_triple(&layout.pack_dir, id(1), now - Duration::from_secs(60));
        seed_triple(&layout.pack_dir, id(2), now);
        PackLog::new(&layout.pack_dir)
            .append(&[id(1), id(2)])
            .unwrap();

        Preserver::new(&repo).preserve_outdated().unwrap();
        let first: Vec<_> = list_sorted(&layout.pack_dir);
        let first_preserved: Vec<_> = list_sorted(&layout.preserved_dir);

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert_eq!(summary.moved_files, 0);
        assert_eq!(list_sorted(&layout.pack_dir), first);
        assert_eq!(list_sorted(&layout.preserved_dir), first_preserved);
    }

    #[test]
    fn empty_keep_set_deletes_the_log() {
        let dir = tempdir().unwrap();
        let repo =
            FakeRepository::new(dir.path()).with_config(CONFIG_PRUNE_PACK_EXPIRE, "now");
        let layout = repo.layout().clone();

        let log = PackLog::new(&layout.pack_dir);
        fs::create_dir_all(&layout.pack_dir).unwrap();
        log.append(&[id(1), id(2)]).unwrap();

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        assert!(summary.snapshot_processed);
        assert_eq!(summary.kept, 0);
        assert!(!log.log_path().exists());
    }

    #[test]
    fn empty_log_is_removed_via_snapshot() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path());
        let layout = repo.layout().clone();

        fs::create_dir_all(&layout.pack_dir).unwrap();
        let log = PackLog::new(&layout.pack_dir);
        log.append(&[]).unwrap();
        assert!(log.log_path().exists());

        Preserver::new(&repo).preserve_outdated().unwrap();
        assert!(!log.log_path().exists());
    }

    #[test]
    fn missing_expire_config_defaults_to_one_hour() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path());
        let layout = repo.layout().clone();

        let now = SystemTime::now();
        seed_triple(&layout.pack_dir, id(1), now - Duration::from_secs(60));
        seed_triple(&layout.pack_dir, id(2), now);
        let log = PackLog::new(&layout.pack_dir);
        log.append(&[id(1), id(2)]).unwrap();

        let summary = Preserver::new(&repo).preserve_outdated().unwrap();
        // One minute old is inside the one-hour default window.
        assert_eq!(summary.moved_files, 0);
        assert_eq!(
            PackLog::read_all(&log.log_path()).unwrap(),
            vec![id(1), id(2)]
        );
    }

    #[test]
    fn snapshot_is_deleted_after_the_pass() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path());
        let layout = repo.layout().clone();

        fs::create_dir_all(&layout.pack_dir).unwrap();
        PackLog::new(&layout.pack_dir).append(&[id(1)]).unwrap();
        Preserver::new(&repo).preserve_outdated().unwrap();

        let snapshots: Vec<_> = fs::read_dir(&layout.pack_dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".snapshot"))
            .collect();
        assert!(snapshots.is_empty(), "left snapshots: {snapshots:?}");
    }

    #[test]
    fn most_recent_bitmap_picks_greatest_mtime() {
        let dir = tempdir().unwrap();
        let pack_dir = dir.path().to_path_buf();

        let now = SystemTime::now();
        seed_triple(&pack_dir, id(1), now - Duration::from_secs(10));
        seed_triple(&pack_dir, id(2), now);

        let best = most_recent_existing_bitmap(&pack_dir).unwrap().unwrap();
        assert_eq!(best, id(2).file_name(PackExt::Bitmap));
    }

    #[test]
    fn most_recent_bitmap_of_missing_dir_is_none() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(most_recent_existing_bitmap(&missing).unwrap().is_none());
    }

    fn list_sorted(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map(|it| {
                it.flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
