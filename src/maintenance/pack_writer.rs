//! Pack writer contract.
//!
//! The actual pack, index, and bitmap encodings belong to the external Git
//! collaborator. The builder drives a one-shot writer through this trait:
//! prepare the object set, then stream each artifact into files the builder
//! stages and publishes itself. This keeps temp-file placement, fsync, and
//! rename ordering under the builder's control.
//!
//! # Protocol
//! 1. `prepare` — compute the object set; returns the object count.
//! 2. `id` — the pack's content hash, valid after a successful `prepare`.
//! 3. `write_pack`, `write_index` — stream the artifacts, in that order.
//! 4. `prepare_bitmap` — true if a bitmap can be produced for this pack.
//! 5. `write_bitmap` — stream the bitmap, only after `prepare_bitmap`.

use std::collections::HashSet;
use std::io::Write;

use super::errors::GitError;
use super::object_id::{ObjectId, PackId};
use super::progress::ProgressMonitor;

/// Object selection for one pack.
#[derive(Clone, Debug, Default)]
pub struct PackRequest {
    /// Objects that must be reachable from the pack (tips to include).
    pub want: HashSet<ObjectId>,
    /// Objects the receiver already has (always empty for repack).
    pub have: HashSet<ObjectId>,
    /// Tips excluded from bitmap selection (tags and configured refs).
    pub no_bitmap: HashSet<ObjectId>,
    /// Objects to hoist early in the pack (tag targets, branch tips).
    pub tag_targets: HashSet<ObjectId>,
    /// Packs whose objects must not be repacked (kept packs).
    pub exclude_packs: Vec<PackId>,
    /// Whether a bitmap index should be prepared.
    pub create_bitmap: bool,
}

/// One-shot pack writer provided by the Git collaborator.
pub trait PackWriter {
    /// Computes the object set for `request`. Returns the object count; a
    /// count of zero means there is nothing to pack and no artifacts may
    /// be written.
    fn prepare(
        &mut self,
        request: &PackRequest,
        progress: &dyn ProgressMonitor,
    ) -> Result<u64, GitError>;

    /// The pack's identity. Only valid after a successful [`prepare`].
    ///
    /// [`prepare`]: PackWriter::prepare
    fn id(&self) -> Result<PackId, GitError>;

    /// Streams the pack data.
    fn write_pack(
        &mut self,
        out: &mut dyn Write,
        progress: &dyn ProgressMonitor,
    ) -> Result<(), GitError>;

    /// Streams the pack index.
    fn write_index(&mut self, out: &mut dyn Write) -> Result<(), GitError>;

    /// Prepares the bitmap index; returns false when no bitmap will be
    /// produced (e.g. the writer cannot bitmap this object set).
    fn prepare_bitmap(&mut self, progress: &dyn ProgressMonitor) -> Result<bool, GitError>;

    /// Streams the bitmap index. Only called after [`prepare_bitmap`]
    /// returned true.
    ///
    /// [`prepare_bitmap`]: PackWriter::prepare_bitmap
    fn write_bitmap(&mut self, out: &mut dyn Write) -> Result<(), GitError>;
}

/// A pack published into the pack directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedPack {
    /// The pack's identity.
    pub id: PackId,
    /// Number of objects in the pack.
    pub object_count: u64,
    /// Whether a bitmap index was published alongside.
    pub has_bitmap: bool,
}
