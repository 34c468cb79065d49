//! Repository path layout.
//!
//! A resolved bundle of the paths the lifecycle stages touch. The layout is
//! purely syntactic; nothing is checked against the filesystem here except
//! in `ensure_preserved_dir`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the GC PID lock in the repository root.
pub const GC_LOCK_FILE: &str = "gc.pid";

/// Resolved paths of a bare repository.
#[derive(Clone, Debug)]
pub struct RepoLayout {
    /// Repository root (the bare repo directory).
    pub repo_dir: PathBuf,
    /// `<repo>/objects`.
    pub objects_dir: PathBuf,
    /// `<repo>/objects/pack` — active packs and the pack log.
    pub pack_dir: PathBuf,
    /// `<repo>/objects/pack/preserved` — packs kept for in-flight clients.
    pub preserved_dir: PathBuf,
    /// `<repo>/gc.pid` — the GC PID lock file.
    pub gc_lock_path: PathBuf,
    /// `<repo>/config`.
    pub config_path: PathBuf,
}

impl RepoLayout {
    /// Resolves the layout for a repository root.
    #[must_use]
    pub fn new(repo_dir: &Path) -> Self {
        let objects_dir = repo_dir.join("objects");
        let pack_dir = objects_dir.join("pack");
        let preserved_dir = pack_dir.join("preserved");
        Self {
            repo_dir: repo_dir.to_path_buf(),
            gc_lock_path: repo_dir.join(GC_LOCK_FILE),
            config_path: repo_dir.join("config"),
            objects_dir,
            pack_dir,
            preserved_dir,
        }
    }

    /// Creates the `preserved/` directory if it does not exist yet.
    pub fn ensure_preserved_dir(&self) -> io::Result<&Path> {
        if !self.preserved_dir.is_dir() {
            fs::create_dir_all(&self.preserved_dir)?;
        }
        Ok(&self.preserved_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_paths() {
        let layout = RepoLayout::new(Path::new("/srv/repo.git"));
        assert_eq!(layout.pack_dir, Path::new("/srv/repo.git/objects/pack"));
        assert_eq!(
            layout.preserved_dir,
            Path::new("/srv/repo.git/objects/pack/preserved")
        );
        assert_eq!(layout.gc_lock_path, Path::new("/srv/repo.git/gc.pid"));
        assert_eq!(layout.config_path, Path::new("/srv/repo.git/config"));
    }

    #[test]
    fn ensure_preserved_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        layout.ensure_preserved_dir().unwrap();
        layout.ensure_preserved_dir().unwrap();
        assert!(layout.preserved_dir.is_dir());
    }
}
