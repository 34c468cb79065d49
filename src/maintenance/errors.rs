//! Error types for the maintenance stages.
//!
//! Errors are stage-specific to keep diagnostics precise. All enums are
//! `#[non_exhaustive]` so variants can be added without breaking callers.
//! Holding the GC PID lock is not modeled here: lock contention is an
//! expected outcome and is reported through each stage's result type, not
//! as an error.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors from pack log operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum PackLogError {
    /// I/O error during log file operations.
    Io(io::Error),
    /// The log file size is not a multiple of the record width, or EOF was
    /// hit inside a record.
    Corrupt { path: PathBuf, detail: String },
}

impl fmt::Display for PackLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "pack log I/O error: {err}"),
            Self::Corrupt { path, detail } => {
                write!(f, "corrupted {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for PackLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Corrupt { .. } => None,
        }
    }
}

impl From<io::Error> for PackLogError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors from the external Git collaborator.
///
/// The collaborator is behind traits; this is the error currency those
/// traits speak. `detail` strings carry human-readable context and are not
/// stable for machine parsing.
#[derive(Debug)]
#[non_exhaustive]
pub enum GitError {
    /// I/O error talking to the repository.
    Io(io::Error),
    /// Repository data is malformed.
    Corrupt { detail: String },
    /// A collaborator subprocess or library call failed.
    Backend { detail: String },
}

impl GitError {
    /// Creates a backend error from any displayable detail.
    pub fn backend(detail: impl Into<String>) -> Self {
        Self::Backend {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "git I/O error: {err}"),
            Self::Corrupt { detail } => write!(f, "corrupt repository data: {detail}"),
            Self::Backend { detail } => write!(f, "git backend error: {detail}"),
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GitError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors from bitmap generation.
#[derive(Debug)]
#[non_exhaustive]
pub enum BitmapBuildError {
    /// I/O error while staging or publishing pack files.
    Io(io::Error),
    /// The Git collaborator failed.
    Git(GitError),
    /// The pack log rejected the produced pack ids.
    Log(PackLogError),
    /// The progress monitor signalled cancellation between phases.
    Cancelled,
    /// Publishing a staged file failed; the artifact was parked at `parked`.
    Publish {
        parked: PathBuf,
        target: PathBuf,
        source: io::Error,
    },
}

impl fmt::Display for BitmapBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "bitmap generation I/O error: {err}"),
            Self::Git(err) => write!(f, "{err}"),
            Self::Log(err) => write!(f, "{err}"),
            Self::Cancelled => write!(f, "bitmap generation cancelled"),
            Self::Publish {
                parked,
                target,
                source,
            } => write!(
                f,
                "cannot publish {} (parked at {}): {source}",
                target.display(),
                parked.display()
            ),
        }
    }
}

impl std::error::Error for BitmapBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Git(err) => Some(err),
            Self::Log(err) => Some(err),
            Self::Publish { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

impl From<io::Error> for BitmapBuildError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<GitError> for BitmapBuildError {
    fn from(err: GitError) -> Self {
        Self::Git(err)
    }
}

impl From<PackLogError> for BitmapBuildError {
    fn from(err: PackLogError) -> Self {
        Self::Log(err)
    }
}

/// Errors from preserving or pruning outdated packs.
#[derive(Debug)]
#[non_exhaustive]
pub enum PreserveError {
    /// I/O error while moving or deleting pack files.
    Io(io::Error),
    /// The pack log or its snapshot could not be read or rewritten.
    Log(PackLogError),
    /// The Git collaborator failed (config lookup).
    Git(GitError),
}

impl fmt::Display for PreserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "preserve I/O error: {err}"),
            Self::Log(err) => write!(f, "{err}"),
            Self::Git(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PreserveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Log(err) => Some(err),
            Self::Git(err) => Some(err),
        }
    }
}

impl From<io::Error> for PreserveError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<PackLogError> for PreserveError {
    fn from(err: PackLogError) -> Self {
        Self::Log(err)
    }
}

impl From<GitError> for PreserveError {
    fn from(err: GitError) -> Self {
        Self::Git(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_log_display_names_path() {
        let err = PackLogError::Corrupt {
            path: PathBuf::from("/r/objects/pack/.ghs-packs.log"),
            detail: "size not multiple of 20".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains(".ghs-packs.log"));
        assert!(msg.contains("multiple of 20"));
    }

    #[test]
    fn io_source_is_preserved() {
        let err = PackLogError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn publish_error_display_names_both_paths() {
        let err = BitmapBuildError::Publish {
            parked: PathBuf::from("/p/pack-x.idx.new"),
            target: PathBuf::from("/p/pack-x.idx"),
            source: io::Error::other("boom"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("pack-x.idx.new"));
        assert!(msg.contains("pack-x.idx"));
    }
}
