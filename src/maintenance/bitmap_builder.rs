//! Bitmap generation (repack with bitmap index).
//!
//! Packs every object reachable from branch and tag tips into one
//! consolidated pack with a pack index and a reachability bitmap, then
//! publishes the triple atomically into `objects/pack/`.
//!
//! # Algorithm
//! 1. Enumerate refs; classify branch tips, tag tips, and other tips.
//!    Collect reflog-reachable ids and (for non-bare repos) index-only
//!    objects into the non-head set.
//! 2. Fold the non-head set into the tip set when single-pack mode is on.
//! 3. Drive the pack writer: prepare the object set, then stream pack,
//!    index, and bitmap into `gc_*` temp files in the pack directory,
//!    each fsynced and set read-only.
//! 4. Rename temp files to their `pack-<id>.<ext>` names. The index is
//!    renamed last so a concurrent pack scanner only observes the new pack
//!    once all siblings exist. A failed sibling rename is parked at a
//!    `.new` name and reported.
//! 5. Wait out a racy pack mtime, then delete `gc_*_tmp` leftovers older
//!    than a day.
//!
//! Cancellation is polled between phases. Once renaming has started the
//! publication always completes; a cancellation arriving that late is not
//! reported because the pack is already live.
//!
//! # Invariants
//! - A concurrent reader sees the old pack set or the complete new triple,
//!   never a partial triple.
//! - Temp files that fail to publish are deleted, not left as garbage.
//! - Kept packs (`.keep` marker) are excluded from repacking unless
//!   configured otherwise.

use std::collections::HashSet;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info};

use super::errors::{BitmapBuildError, GitError};
use super::fs_util;
use super::object_id::{ObjectId, PackExt, PackId};
use super::pack_writer::{PackRequest, PublishedPack};
use super::progress::ProgressMonitor;
use super::repository::Repository;

/// Age after which abandoned `gc_*_tmp` staging files are removed.
const STALE_TMP_AGE: Duration = Duration::from_secs(24 * 3600);
/// Upper bound on the racy-pack mtime wait.
const RACY_WAIT_MAX: Duration = Duration::from_secs(5);

/// Tuning for bitmap generation.
#[derive(Clone, Debug, Default)]
pub struct BitmapConfig {
    /// Fold non-head objects into the consolidated pack instead of leaving
    /// them out of the bitmap pack.
    pub single_pack: bool,
    /// Repack objects from kept packs too.
    pub pack_kept_objects: bool,
    /// Ref name prefixes whose tips are excluded from bitmap selection.
    pub bitmap_excluded_ref_prefixes: Vec<String>,
}

/// Repacks reachable objects and generates a bitmap index.
///
/// Instances are single-use per invocation and not thread-safe.
pub struct BitmapBuilder<'a> {
    repo: &'a dyn Repository,
    config: BitmapConfig,
}

impl<'a> BitmapBuilder<'a> {
    /// Creates a builder over `repo`.
    #[must_use]
    pub fn new(repo: &'a dyn Repository, config: BitmapConfig) -> Self {
        Self { repo, config }
    }

    /// Runs the repack and returns the published packs.
    ///
    /// An empty vector means there was nothing to pack. The caller is
    /// responsible for holding the GC PID lock and for recording the
    /// result in the pack log.
    pub fn repack_and_generate_bitmap(
        &self,
        progress: &dyn ProgressMonitor,
    ) -> Result<Vec<PublishedPack>, BitmapBuildError> {
        self.check_cancelled(progress)?;
        progress.begin_phase("refs");

        let selection = self.select_objects(progress)?;
        if selection.want.is_empty() {
            info!("no refs to pack, skipping bitmap generation");
            return Ok(Vec::new());
        }

        let request = PackRequest {
            want: selection.want,
            have: HashSet::new(),
            no_bitmap: selection.no_bitmap,
            tag_targets: selection.tag_targets,
            exclude_packs: self.excluded_packs()?,
            create_bitmap: true,
        };

        self.check_cancelled(progress)?;
        progress.begin_phase("objects");

        let mut writer = self.repo.new_pack_writer()?;
        let object_count = writer.prepare(&request, progress)?;
        if object_count == 0 {
            info!("pack writer selected no objects, skipping bitmap generation");
            return Ok(Vec::new());
        }
        let id = writer.id()?;
        debug!(pack = %id, objects = object_count, "prepared consolidated pack");

        let pack_dir = &self.repo.layout().pack_dir;
        fs::create_dir_all(pack_dir)?;

        self.check_cancelled(progress)?;
        progress.begin_phase("pack");
        let tmp_pack = stage_artifact(pack_dir, PackExt::Pack, |out| {
            writer.write_pack(out, progress)
        })?;

        self.check_cancelled(progress)?;
        progress.begin_phase("index");
        let tmp_idx = stage_artifact(pack_dir, PackExt::Index, |out| writer.write_index(out))?;

        self.check_cancelled(progress)?;
        progress.begin_phase("bitmap");
        let tmp_bitmap = if writer.prepare_bitmap(progress)? {
            Some(stage_artifact(pack_dir, PackExt::Bitmap, |out| {
                writer.write_bitmap(out)
            })?)
        } else {
            None
        };

        // Publication point: from here on the operation runs to completion
        // even if cancellation is requested.
        progress.begin_phase("publish");
        let has_bitmap = tmp_bitmap.is_some();
        let pack_path = publish(tmp_pack, &id, pack_dir, PackExt::Pack)?;
        if let Some(tmp_bitmap) = tmp_bitmap {
            publish_sibling(tmp_bitmap, &id, pack_dir, PackExt::Bitmap)?;
        }
        publish_sibling(tmp_idx, &id, pack_dir, PackExt::Index)?;
        info!(pack = %id, objects = object_count, has_bitmap, "published pack");

        wait_until_not_racy(&pack_path);
        delete_stale_tmp_files(pack_dir);

        Ok(vec![PublishedPack {
            id,
            object_count,
            has_bitmap,
        }])
    }

    /// Computes the tip sets from refs, reflogs, and the index.
    fn select_objects(
        &self,
        progress: &dyn ProgressMonitor,
    ) -> Result<ObjectSelection, BitmapBuildError> {
        let refdb = self.repo.ref_database();
        let refs = refdb.refs()?;

        let mut all_heads: HashSet<ObjectId> = HashSet::new();
        let mut all_tags: HashSet<ObjectId> = HashSet::new();
        let mut non_heads: HashSet<ObjectId> = HashSet::new();
        let mut tag_targets: HashSet<ObjectId> = HashSet::new();

        for record in &refs {
            self.check_cancelled(progress)?;
            for entry in refdb.reflog(&record.name)? {
                if !entry.new_id.is_zero() {
                    non_heads.insert(entry.new_id);
                }
                if !entry.old_id.is_zero() {
                    non_heads.insert(entry.old_id);
                }
            }
            let Some(target) = record.target else {
                continue;
            };
            if record.symbolic {
                continue;
            }
            if record.is_head() {
                all_heads.insert(target);
            } else if record.is_tag() {
                all_tags.insert(target);
            } else {
                non_heads.insert(target);
            }
            if let Some(peeled) = record.peeled {
                tag_targets.insert(peeled);
            }
        }

        // Tags that are also branch tips are bitmap candidates.
        for head in &all_heads {
            all_tags.remove(head);
        }
        let mut want: HashSet<ObjectId> = all_heads.union(&all_tags).copied().collect();

        // Hoist branch tips and tags early in the pack file.
        tag_targets.extend(want.iter().copied());

        if !self.repo.is_bare() {
            non_heads.extend(self.repo.index_objects()?);
        }

        if self.config.single_pack {
            want.extend(non_heads.drain());
        }

        let mut no_bitmap = all_tags;
        if !self.config.bitmap_excluded_ref_prefixes.is_empty() {
            for record in refdb.refs_by_prefix(&self.config.bitmap_excluded_ref_prefixes)? {
                if let Some(target) = record.target {
                    no_bitmap.insert(target);
                }
            }
        }

        Ok(ObjectSelection {
            want,
            no_bitmap,
            tag_targets,
        })
    }

    fn excluded_packs(&self) -> Result<Vec<PackId>, GitError> {
        if self.config.pack_kept_objects {
            Ok(Vec::new())
        } else {
            self.repo.kept_packs()
        }
    }

    fn check_cancelled(&self, progress: &dyn ProgressMonitor) -> Result<(), BitmapBuildError> {
        if progress.is_cancelled() {
            Err(BitmapBuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct ObjectSelection {
    want: HashSet<ObjectId>,
    no_bitmap: HashSet<ObjectId>,
    tag_targets: HashSet<ObjectId>,
}

/// Streams one artifact into a `gc_*` temp file, fsyncs it, and marks it
/// read-only. The temp file self-deletes unless it is published.
fn stage_artifact<F>(
    pack_dir: &Path,
    ext: PackExt,
    write: F,
) -> Result<tempfile::NamedTempFile, BitmapBuildError>
where
    F: FnOnce(&mut dyn std::io::Write) -> Result<(), GitError>,
{
    let mut staged = tempfile::Builder::new()
        .prefix("gc_")
        .suffix(&format!(".{}", ext.tmp_extension()))
        .tempfile_in(pack_dir)?;

    write(staged.as_file_mut())?;
    staged.as_file_mut().flush()?;
    fs_util::sync_file(staged.as_file())?;

    let mut perms = staged.as_file().metadata()?.permissions();
    perms.set_readonly(true);
    staged.as_file().set_permissions(perms)?;

    Ok(staged)
}

/// Renames the staged pack file to its final name.
fn publish(
    staged: tempfile::NamedTempFile,
    id: &PackId,
    pack_dir: &Path,
    ext: PackExt,
) -> Result<PathBuf, BitmapBuildError> {
    let target = id.file_path(pack_dir, ext);
    staged
        .persist(&target)
        .map_err(|err| BitmapBuildError::Io(err.error))?;
    Ok(target)
}

/// Renames a staged sibling (index or bitmap), parking it at `<name>.new`
/// when the rename fails so the pack directory is never left with a
/// half-named artifact.
fn publish_sibling(
    staged: tempfile::NamedTempFile,
    id: &PackId,
    pack_dir: &Path,
    ext: PackExt,
) -> Result<(), BitmapBuildError> {
    let target = id.file_path(pack_dir, ext);
    match staged.persist(&target) {
        Ok(_) => Ok(()),
        Err(err) => {
            let source = err.error;
            let staged = err.file;
            let parked = pack_dir.join(format!("{}.new", id.file_name(ext)));
            let parked = match staged.persist(&parked) {
                Ok(_) => parked,
                Err(second) => second.file.path().to_path_buf(),
            };
            Err(BitmapBuildError::Publish {
                parked,
                target,
                source,
            })
        }
    }
}

/// Waits until the published pack's mtime is clearly in the past so later
/// directory scans cannot mistake it for an in-flight write.
fn wait_until_not_racy(pack_path: &Path) {
    let Ok(meta) = fs::metadata(pack_path) else {
        return;
    };
    let Ok(mtime) = meta.modified() else {
        return;
    };

    let deadline = SystemTime::now() + RACY_WAIT_MAX;
    while SystemTime::now() <= mtime {
        if SystemTime::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

/// Removes abandoned staging files older than [`STALE_TMP_AGE`].
fn delete_stale_tmp_files(pack_dir: &Path) {
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!(dir = %pack_dir.display(), "cannot scan pack dir for stale temp files: {err}");
            return;
        }
    };

    let threshold = SystemTime::now() - STALE_TMP_AGE;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with("gc_") || !name.ends_with("_tmp") {
            continue;
        }
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime < threshold)
            .unwrap_or(false);
        if stale {
            if let Err(err) = fs::remove_file(entry.path()) {
                error!(file = %entry.path().display(), "cannot delete stale temp file: {err}");
            } else {
                debug!(file = %entry.path().display(), "deleted stale temp file");
            }
        }
    }
}
