//! Repository contract.
//!
//! The single seam between the lifecycle core and the external Git
//! implementation. Production wires this to a `git`-CLI-backed collaborator;
//! tests wire it to in-memory fakes. The core never touches ref storage,
//! object storage, or config parsing directly — only the pack directory
//! and the pack log are its own.

use std::collections::HashSet;

use super::errors::GitError;
use super::object_id::{ObjectId, PackId};
use super::pack_writer::PackWriter;
use super::progress::ProgressMonitor;
use super::refs::RefDatabase;
use super::repo::RepoLayout;

/// Config key controlling the preserve grace window.
pub const CONFIG_PRUNE_PACK_EXPIRE: &str = "gc.prunePackExpire";

/// The Git repository surface the maintenance actions require.
pub trait Repository {
    /// Resolved filesystem layout.
    fn layout(&self) -> &RepoLayout;

    /// Ref and reflog access.
    fn ref_database(&self) -> &dyn RefDatabase;

    /// Creates a fresh one-shot pack writer.
    fn new_pack_writer(&self) -> Result<Box<dyn PackWriter>, GitError>;

    /// Ids of packs carrying a `.keep` marker.
    fn kept_packs(&self) -> Result<Vec<PackId>, GitError>;

    /// True for bare repositories (no working tree, no index).
    fn is_bare(&self) -> bool {
        true
    }

    /// Objects present in the working-tree index but not reachable from
    /// HEAD. Empty for bare repositories.
    fn index_objects(&self) -> Result<HashSet<ObjectId>, GitError> {
        Ok(HashSet::new())
    }

    /// Reads a raw config value, `None` when unset.
    fn config_get(&self, key: &str) -> Result<Option<String>, GitError>;

    /// Runs the collaborator's full garbage collection.
    fn garbage_collect(&self, progress: &dyn ProgressMonitor) -> Result<(), GitError>;

    /// Packs loose refs into the packed ref store.
    fn pack_refs(&self) -> Result<(), GitError>;
}
