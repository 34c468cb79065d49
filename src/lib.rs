//! Scheduled housekeeping for bare Git repositories.
//!
//! The crate runs one maintenance action per invocation: generate pack
//! bitmaps, garbage-collect, pack loose refs, preserve outdated pack
//! artifacts, or prune them. The interesting part is the bitmap lifecycle:
//!
//! 1. Bitmap generation publishes a consolidated pack (pack + index +
//!    bitmap) with atomic renames and records its identity in a binary
//!    append-only log (`objects/pack/.ghs-packs.log`, 20-byte records).
//! 2. The preserve pass snapshots the log, moves superseded packs into
//!    `objects/pack/preserved/` once they age past `gc.prunePackExpire`,
//!    and rewrites the log from the retained set.
//! 3. Preserved packs are eventually deleted after the grace window; a
//!    legacy prune variant keeps a fixed last-two window instead.
//!
//! Cross-process safety comes from two locks: a try-lock PID file
//! (`gc.pid`) excluding concurrent pack-set mutation, and an exclusive
//! `flock` on the log file serializing all log access, reads included.
//!
//! The Git implementation itself (object database, ref store, pack and
//! bitmap encodings) is an external collaborator behind the traits in
//! [`maintenance::repository`]; production binds them to the `git` binary
//! via [`git_cli`], tests bind them to in-memory fakes.

pub mod actions;
pub mod cli;
pub mod git_cli;
pub mod logging;
pub mod maintenance;
