//! Filesystem move primitives shared by the lifecycle stages.
//!
//! Moves prefer `rename(2)`, which is atomic within a directory. When the
//! rename is rejected (typically a cross-device target), the move degrades
//! to copy-then-delete. Same-directory moves should never hit the fallback.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Moves `source` to `target` if `source` exists.
///
/// Returns `Ok(true)` when a move happened, `Ok(false)` when the source was
/// missing. The target must not require `REPLACE` semantics beyond what
/// `rename` provides (an existing target is overwritten).
pub fn move_if_exists(source: &Path, target: &Path) -> io::Result<bool> {
    if !source.exists() {
        debug!(
            source = %source.display(),
            target = %target.display(),
            "move skipped, source does not exist"
        );
        return Ok(false);
    }
    move_file(source, target)?;
    debug!(source = %source.display(), target = %target.display(), "moved");
    Ok(true)
}

/// Moves `source` over `target`, replacing it, falling back to a
/// copy-then-delete when the rename is rejected by the OS.
pub fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Cross-device or otherwise non-atomic path; degrade.
            match fs::copy(source, target).and_then(|_| fs::remove_file(source)) {
                Ok(()) => Ok(()),
                Err(_) => Err(rename_err),
            }
        }
    }
}

/// Flushes file content and metadata to disk.
pub fn sync_file(file: &fs::File) -> io::Result<()> {
    file.sync_all()
}
