//! Maintenance actions.
//!
//! Each action is one scheduler-invoked operation over a repository path.
//! Actions never panic the process: every failure is folded into an
//! [`ActionResult`] and the full cause is logged. The pack-set-mutating
//! actions (bitmap generation, preserve, prune) first take the GC PID
//! lock with try-lock semantics; contention is reported as a successful
//! skip so the scheduler does not retry frantically.
//!
//! Action lookup is an explicit name match, not reflection; the recognized
//! names are listed in [`ACTION_NAMES`].

pub mod execution;
pub mod stats;

use std::path::Path;

use serde::Serialize;
use tracing::{error, info};

use crate::git_cli::GitCliRepository;
use crate::maintenance::{
    BitmapBuildError, BitmapBuilder, BitmapConfig, GcPidLock, NullProgressMonitor, PackLog,
    Preserver, PruneOrchestrator, RepoLayout, Repository,
};

pub use execution::ExecutionResult;
pub use stats::{StatsCollector, StatsResult};

/// Config key toggling repack of kept objects.
const CONFIG_PACK_KEPT_OBJECTS: &str = "repack.packKeptObjects";
/// Config key listing ref prefixes excluded from bitmap selection.
const CONFIG_BITMAP_EXCLUDED_REFS: &str = "pack.bitmapExcludedRefsPrefixes";

/// The recognized action names, in dispatch order.
pub const ACTION_NAMES: [&str; 5] = [
    "BitmapGenerationAction",
    "GarbageCollectionAction",
    "PackRefsAction",
    "PreserveOutdatedBitmapsAction",
    "PruneOutdatedBitmapsAction",
];

/// Outcome of one action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// Whether the action completed as intended.
    pub successful: bool,
    /// Optional human-readable detail (failure cause or skip reason).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResult {
    /// Successful result without a message.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            successful: true,
            message: None,
        }
    }

    /// Successful result with an explanatory message.
    #[must_use]
    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            successful: true,
            message: Some(message.into()),
        }
    }

    /// Failed result with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            successful: false,
            message: Some(message.into()),
        }
    }
}

/// A scheduler-invoked maintenance operation.
pub trait Action {
    /// Runs the action against the repository at `repository_path`.
    fn apply(&self, repository_path: &Path) -> ActionResult;
}

/// Flags shared by the actions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActionOptions {
    /// Force bitmap generation to emit a single consolidated pack.
    pub single_pack: bool,
}

/// Resolves an action by its external name.
#[must_use]
pub fn action_for_name(name: &str, options: ActionOptions) -> Option<Box<dyn Action>> {
    match name {
        "BitmapGenerationAction" => Some(Box::new(BitmapGenerationAction {
            single_pack: options.single_pack,
        })),
        "GarbageCollectionAction" => Some(Box::new(GarbageCollectionAction)),
        "PackRefsAction" => Some(Box::new(PackRefsAction)),
        "PreserveOutdatedBitmapsAction" => Some(Box::new(PreserveOutdatedBitmapsAction)),
        "PruneOutdatedBitmapsAction" => Some(Box::new(PruneOutdatedBitmapsAction)),
        _ => None,
    }
}

/// Generates a consolidated pack with a bitmap and records it in the pack
/// log.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitmapGenerationAction {
    /// Emit a single pack covering non-head objects too.
    pub single_pack: bool,
}

impl Action for BitmapGenerationAction {
    fn apply(&self, repository_path: &Path) -> ActionResult {
        let layout = RepoLayout::new(repository_path);
        let _lock = match GcPidLock::try_acquire(&layout) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                let message = format!(
                    "Skipped bitmap generation: already ongoing in repository {}",
                    repository_path.display()
                );
                info!("{message}");
                return ActionResult::ok_with(message);
            }
            Err(err) => {
                error!(repo = %repository_path.display(), "cannot acquire gc lock: {err}");
                return ActionResult::failed(format!(
                    "Bitmap generation action failed, message: {err}"
                ));
            }
        };

        let repo = match GitCliRepository::open(repository_path) {
            Ok(repo) => repo,
            Err(err) => {
                error!(repo = %repository_path.display(), "cannot open repository: {err}");
                return ActionResult::failed(format!(
                    "Bitmap generation action failed, message: {err}"
                ));
            }
        };

        run_bitmap_generation(&repo, self.single_pack)
    }
}

/// Bitmap generation against an already-opened repository.
///
/// Split out so tests can drive it with a fake collaborator; the caller
/// holds the GC PID lock.
pub(crate) fn run_bitmap_generation(repo: &dyn Repository, single_pack: bool) -> ActionResult {
    let config = bitmap_config(repo, single_pack);
    let builder = BitmapBuilder::new(repo, config);

    let packs = match builder.repack_and_generate_bitmap(&NullProgressMonitor) {
        Ok(packs) => packs,
        Err(BitmapBuildError::Cancelled) => {
            return ActionResult::failed("Bitmap generation cancelled");
        }
        Err(err) => {
            error!(repo = %repo.layout().repo_dir.display(), "bitmap generation failed: {err}");
            return ActionResult::failed(format!(
                "Bitmap generation action failed, message: {err}"
            ));
        }
    };

    if packs.is_empty() {
        return ActionResult::ok();
    }

    let ids: Vec<_> = packs.iter().map(|p| p.id).collect();
    match PackLog::new(&repo.layout().pack_dir).append(&ids) {
        Ok(_) => ActionResult::ok(),
        Err(err) => {
            error!(repo = %repo.layout().repo_dir.display(), "pack log update failed: {err}");
            ActionResult::failed(format!("Bitmap generation action failed, message: {err}"))
        }
    }
}

fn bitmap_config(repo: &dyn Repository, single_pack: bool) -> BitmapConfig {
    let pack_kept_objects = repo
        .config_get(CONFIG_PACK_KEPT_OBJECTS)
        .ok()
        .flatten()
        .map(|v| matches!(v.trim(), "true" | "yes" | "on" | "1"))
        .unwrap_or(false);
    let bitmap_excluded_ref_prefixes = repo
        .config_get(CONFIG_BITMAP_EXCLUDED_REFS)
        .ok()
        .flatten()
        .map(|v| {
            v.split([',', ' '])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    BitmapConfig {
        single_pack,
        pack_kept_objects,
        bitmap_excluded_ref_prefixes,
    }
}

/// Runs the collaborator's full garbage collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct GarbageCollectionAction;

impl Action for GarbageCollectionAction {
    fn apply(&self, repository_path: &Path) -> ActionResult {
        let repo = match GitCliRepository::open(repository_path) {
            Ok(repo) => repo,
            Err(err) => {
                error!(repo = %repository_path.display(), "cannot open repository: {err}");
                return ActionResult::failed(format!(
                    "Garbage collection action failed, message: {err}"
                ));
            }
        };
        match repo.garbage_collect(&NullProgressMonitor) {
            Ok(()) => ActionResult::ok(),
            Err(err) => {
                error!(repo = %repository_path.display(), "garbage collection failed: {err}");
                ActionResult::failed(format!("Garbage collection action failed, message: {err}"))
            }
        }
    }
}

/// Packs loose refs into the packed ref store.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackRefsAction;

impl Action for PackRefsAction {
    fn apply(&self, repository_path: &Path) -> ActionResult {
        let repo = match GitCliRepository::open(repository_path) {
            Ok(repo) => repo,
            Err(err) => {
                error!(repo = %repository_path.display(), "cannot open repository: {err}");
                return ActionResult::failed(format!(
                    "Packed refs generation action failed, message: {err}"
                ));
            }
        };
        match repo.pack_refs() {
            Ok(()) => ActionResult::ok(),
            Err(err) => {
                error!(repo = %repository_path.display(), "pack refs failed: {err}");
                ActionResult::failed(format!(
                    "Packed refs generation action failed, message: {err}"
                ))
            }
        }
    }
}

/// Moves superseded packs to `preserved/` subject to the grace window.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreserveOutdatedBitmapsAction;

impl Action for PreserveOutdatedBitmapsAction {
    fn apply(&self, repository_path: &Path) -> ActionResult {
        let layout = RepoLayout::new(repository_path);
        let _lock = match GcPidLock::try_acquire(&layout) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                let message = format!(
                    "Skipped preserving outdated bitmaps: maintenance already ongoing in repository {}",
                    repository_path.display()
                );
                info!("{message}");
                return ActionResult::ok_with(message);
            }
            Err(err) => {
                return ActionResult::failed(format!(
                    "Preserve packs action failed, message: {err}"
                ));
            }
        };

        let repo = match GitCliRepository::open(repository_path) {
            Ok(repo) => repo,
            Err(err) => {
                error!(repo = %repository_path.display(), "cannot open repository: {err}");
                return ActionResult::failed(format!(
                    "Preserve packs action failed, message: {err}"
                ));
            }
        };

        run_preserve(&repo)
    }
}

/// Preserve pass against an already-opened repository.
pub(crate) fn run_preserve(repo: &dyn Repository) -> ActionResult {
    match Preserver::new(repo).preserve_outdated() {
        Ok(summary) => {
            info!(
                repo = %repo.layout().repo_dir.display(),
                moved_files = summary.moved_files,
                "preserve outdated bitmaps finished"
            );
            ActionResult::ok()
        }
        Err(err) => {
            error!(repo = %repo.layout().repo_dir.display(), "preserve failed: {err}");
            ActionResult::failed(format!("Preserve packs action failed, message: {err}"))
        }
    }
}

/// Legacy prune keeping only the last two generations.
#[derive(Clone, Copy, Debug, Default)]
pub struct PruneOutdatedBitmapsAction;

impl Action for PruneOutdatedBitmapsAction {
    fn apply(&self, repository_path: &Path) -> ActionResult {
        let layout = RepoLayout::new(repository_path);
        let _lock = match GcPidLock::try_acquire(&layout) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                let message = format!(
                    "Skipped pruning outdated bitmaps: maintenance already ongoing in repository {}",
                    repository_path.display()
                );
                info!("{message}");
                return ActionResult::ok_with(message);
            }
            Err(err) => {
                return ActionResult::failed(format!(
                    "Prune bitmaps action failed, message: {err}"
                ));
            }
        };

        match PruneOrchestrator::new(&layout).prune_outdated() {
            Ok(summary) => {
                info!(
                    repo = %repository_path.display(),
                    processed_files = summary.processed_files,
                    "prune outdated bitmaps finished"
                );
                ActionResult::ok()
            }
            Err(err) => {
                error!(repo = %repository_path.display(), "prune failed: {err}");
                ActionResult::failed(format!("Prune bitmaps action failed, message: {err}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::test_support::{FakeRepository, SAMPLE_PACK_ID};
    use crate::maintenance::{ObjectId, PackExt, ID_RAW_LEN};
    use tempfile::tempdir;

    #[test]
    fn dispatch_covers_exactly_the_known_names() {
        for name in ACTION_NAMES {
            assert!(
                action_for_name(name, ActionOptions::default()).is_some(),
                "{name}"
            );
        }
        assert!(action_for_name("NoSuchAction", ActionOptions::default()).is_none());
        assert!(action_for_name("bitmapgenerationaction", ActionOptions::default()).is_none());
    }

    #[test]
    fn bitmap_generation_appends_produced_pack_to_log() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path())
            .with_branch("refs/heads/main", ObjectId::from_raw([1; ID_RAW_LEN]));

        let result = run_bitmap_generation(&repo, false);
        assert!(result.successful);

        let log_path = repo.layout().pack_dir.join(crate::maintenance::LOG_FILE_NAME);
        let ids = PackLog::read_all(&log_path).unwrap();
        assert_eq!(ids, vec![SAMPLE_PACK_ID]);
        assert!(SAMPLE_PACK_ID
            .file_path(&repo.layout().pack_dir, PackExt::Bitmap)
            .is_file());
    }

    #[test]
    fn bitmap_generation_does_not_duplicate_log_entries() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path())
            .with_branch("refs/heads/main", ObjectId::from_raw([1; ID_RAW_LEN]));

        assert!(run_bitmap_generation(&repo, false).successful);
        assert!(run_bitmap_generation(&repo, false).successful);

        let log_path = repo.layout().pack_dir.join(crate::maintenance::LOG_FILE_NAME);
        assert_eq!(
            std::fs::metadata(&log_path).unwrap().len(),
            ID_RAW_LEN as u64
        );
    }

    #[test]
    fn bitmap_generation_with_nothing_to_pack_is_ok_without_log() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path());

        let result = run_bitmap_generation(&repo, false);
        assert!(result.successful);
        assert!(!repo
            .layout()
            .pack_dir
            .join(crate::maintenance::LOG_FILE_NAME)
            .exists());
    }

    #[test]
    fn held_gc_lock_skips_bitmap_generation() {
        let dir = tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let _held = GcPidLock::try_acquire(&layout).unwrap().unwrap();

        let result = BitmapGenerationAction::default().apply(dir.path());
        assert!(result.successful);
        let message = result.message.unwrap();
        assert!(
            message.starts_with("Skipped bitmap generation"),
            "{message}"
        );
        assert!(!layout.pack_dir.exists());
    }

    #[test]
    fn held_gc_lock_skips_preserve_without_failing() {
        let dir = tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let _held = GcPidLock::try_acquire(&layout).unwrap().unwrap();

        let result = PreserveOutdatedBitmapsAction.apply(dir.path());
        assert!(result.successful);
        assert!(result.message.unwrap().contains("Skipped"));
        assert!(!layout.pack_dir.exists());
    }

    #[test]
    fn held_gc_lock_skips_prune_without_failing() {
        let dir = tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let _held = GcPidLock::try_acquire(&layout).unwrap().unwrap();

        let result = PruneOutdatedBitmapsAction.apply(dir.path());
        assert!(result.successful);
        assert!(result.message.unwrap().contains("Skipped"));
        assert!(!layout.pack_dir.exists());
    }

    #[test]
    fn preserve_on_fake_repo_reports_ok() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path());
        let result = run_preserve(&repo);
        assert!(result.successful);
    }

    #[test]
    fn bitmap_config_reads_collaborator_config() {
        let dir = tempdir().unwrap();
        let repo = FakeRepository::new(dir.path())
            .with_config(CONFIG_PACK_KEPT_OBJECTS, "true")
            .with_config(CONFIG_BITMAP_EXCLUDED_REFS, "refs/sandbox/,refs/backup/");

        let config = bitmap_config(&repo, true);
        assert!(config.single_pack);
        assert!(config.pack_kept_objects);
        assert_eq!(
            config.bitmap_excluded_ref_prefixes,
            vec!["refs/sandbox/".to_string(), "refs/backup/".to_string()]
        );
    }
}
