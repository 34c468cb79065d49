//! Pack bitmap lifecycle modules.
//!
//! The lifecycle is a small state machine over the files in
//! `objects/pack/`:
//!
//! 1. `bitmap_builder` publishes a consolidated pack with index and bitmap
//!    and the produced id is appended to `pack_log`.
//! 2. `preserve` snapshots the log, moves superseded packs into
//!    `preserved/` once they age past the grace window, and rewrites the
//!    log from the retained set.
//! 3. Preserved packs are eventually deleted once past the prune cutoff;
//!    `prune` is the legacy variant that keeps a fixed last-two window.
//!
//! Cross-process coordination uses two locks: the GC PID lock
//! (`gc_lock`), a try-lock mutex over any pack-set mutation, and the
//! exclusive log file lock (`file_lock`) serializing all pack log access.
//!
//! # Invariants
//! - The log size is always a multiple of 20 bytes; record order is
//!   publish order.
//! - A pack id in the log has its triple either active, preserved, or
//!   pruned after the grace window.
//! - Publishing and snapshotting use atomic renames; readers never see
//!   partial state.

pub mod bitmap_builder;
pub mod errors;
pub mod expire;
pub mod file_lock;
pub mod fs_util;
pub mod gc_lock;
pub mod object_id;
pub mod pack_log;
pub mod pack_writer;
pub mod preserve;
pub mod progress;
pub mod prune;
pub mod refs;
pub mod repo;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

pub use bitmap_builder::{BitmapBuilder, BitmapConfig};
pub use errors::{BitmapBuildError, GitError, PackLogError, PreserveError};
pub use expire::{parse_expire, resolve_expire, ExpireCutoff, DEFAULT_EXPIRE};
pub use file_lock::LockedFile;
pub use gc_lock::GcPidLock;
pub use object_id::{ObjectId, PackExt, PackId, ID_HEX_LEN, ID_RAW_LEN};
pub use pack_log::{AppendStats, PackLog, LOG_FILE_NAME};
pub use pack_writer::{PackRequest, PackWriter, PublishedPack};
pub use preserve::{most_recent_existing_bitmap, PreserveSummary, Preserver};
pub use progress::{NullProgressMonitor, ProgressMonitor};
pub use prune::{PruneOrchestrator, PruneSummary};
pub use refs::{RefDatabase, RefRecord, ReflogEntry, R_HEADS, R_REFS, R_TAGS};
pub use repo::{RepoLayout, GC_LOCK_FILE};
pub use repository::{Repository, CONFIG_PRUNE_PACK_EXPIRE};
