//! `git`-CLI-backed repository collaborator.
//!
//! Implements the repository contract by invoking the `git` binary in the
//! target repository. Supported subset:
//! - refs and peeled ids via `git for-each-ref`;
//! - reflog new-ids via `git reflog show`, with each entry's old-id
//!   reconstructed from its successor (the oldest entry's old-id is
//!   reported as zero);
//! - config via `git config --get`;
//! - GC via `git gc`, ref packing via `git pack-refs --all --prune`;
//! - pack production via `git pack-objects --write-bitmap-index` into a
//!   staging directory whose artifacts back the pack-writer streams.
//!
//! `pack-objects` applies its own bitmap selection internally, so the
//! request's `no_bitmap` and `tag_targets` hints are not forwarded;
//! kept packs are honored through `--honor-pack-keep`. The repository is
//! treated as bare: working-tree index objects are never collected.

use std::fs::{self, File};
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::maintenance::{
    GitError, ObjectId, PackExt, PackId, PackRequest, PackWriter, ProgressMonitor, RefDatabase,
    RefRecord, ReflogEntry, RepoLayout, Repository,
};

/// Repository collaborator backed by the `git` binary.
#[derive(Clone, Debug)]
pub struct GitCliRepository {
    layout: RepoLayout,
}

impl GitCliRepository {
    /// Opens the repository at `repo_dir`.
    ///
    /// Only the layout is validated here; individual operations surface
    /// their own failures.
    pub fn open(repo_dir: &Path) -> Result<Self, GitError> {
        let layout = RepoLayout::new(repo_dir);
        if !layout.objects_dir.is_dir() {
            return Err(GitError::Corrupt {
                detail: format!("not a git repository: {}", repo_dir.display()),
            });
        }
        Ok(Self { layout })
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir").arg(&self.layout.repo_dir);
        cmd
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<String, GitError> {
        debug!(?cmd, "running git");
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(GitError::backend(format!(
                "{what} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| GitError::backend(format!("{what} produced non-UTF-8 output")))
    }
}

impl RefDatabase for GitCliRepository {
    fn refs(&self) -> Result<Vec<RefRecord>, GitError> {
        self.for_each_ref(&[])
    }

    fn refs_by_prefix(&self, prefixes: &[String]) -> Result<Vec<RefRecord>, GitError> {
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }
        self.for_each_ref(prefixes)
    }

    fn reflog(&self, ref_name: &str) -> Result<Vec<ReflogEntry>, GitError> {
        let mut cmd = self.git();
        cmd.args(["reflog", "show", "--format=%H"]).arg(ref_name);
        let stdout = match self.run(cmd, "git reflog show") {
            Ok(stdout) => stdout,
            // Missing reflog (or unborn ref) is an empty reflog.
            Err(GitError::Backend { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let new_ids: Vec<ObjectId> = stdout
            .lines()
            .filter_map(|line| ObjectId::from_hex(line.trim()))
            .collect();
        let entries = new_ids
            .iter()
            .enumerate()
            .map(|(i, &new_id)| ReflogEntry {
                new_id,
                old_id: new_ids.get(i + 1).copied().unwrap_or_else(ObjectId::zero),
            })
            .collect();
        Ok(entries)
    }
}

impl GitCliRepository {
    fn for_each_ref(&self, patterns: &[String]) -> Result<Vec<RefRecord>, GitError> {
        let mut cmd = self.git();
        cmd.args([
            "for-each-ref",
            "--format=%(objectname)%09%(refname)%09%(symref)%09%(*objectname)",
        ]);
        for pattern in patterns {
            cmd.arg(pattern);
        }
        let stdout = self.run(cmd, "git for-each-ref")?;
        Ok(stdout.lines().filter_map(parse_for_each_ref_line).collect())
    }
}

/// Parses one `for-each-ref` TSV line: `objectname refname symref peeled`.
fn parse_for_each_ref_line(line: &str) -> Option<RefRecord> {
    let mut fields = line.split('\t');
    let objectname = fields.next()?;
    let refname = fields.next()?;
    let symref = fields.next().unwrap_or("");
    let peeled = fields.next().unwrap_or("");

    if refname.is_empty() {
        return None;
    }
    Some(RefRecord {
        name: refname.to_string(),
        target: ObjectId::from_hex(objectname),
        peeled: ObjectId::from_hex(peeled),
        symbolic: !symref.is_empty(),
    })
}

impl Repository for GitCliRepository {
    fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    fn ref_database(&self) -> &dyn RefDatabase {
        self
    }

    fn new_pack_writer(&self) -> Result<Box<dyn PackWriter>, GitError> {
        Ok(Box::new(GitCliPackWriter {
            layout: self.layout.clone(),
            staged: None,
        }))
    }

    fn kept_packs(&self) -> Result<Vec<PackId>, GitError> {
        let entries = match fs::read_dir(&self.layout.pack_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut kept = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(".keep") {
                if let Some(id) = PackId::from_file_name(name) {
                    kept.push(id);
                }
            }
        }
        Ok(kept)
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        let mut cmd = self.git();
        cmd.args(["config", "--get", key]);
        let output = cmd.output()?;
        if output.status.success() {
            let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(Some(value))
        } else {
            // Exit code 1 means the key is unset.
            Ok(None)
        }
    }

    fn garbage_collect(&self, _progress: &dyn ProgressMonitor) -> Result<(), GitError> {
        let mut cmd = self.git();
        cmd.args(["gc", "--quiet"]);
        self.run(cmd, "git gc").map(|_| ())
    }

    fn pack_refs(&self) -> Result<(), GitError> {
        let mut cmd = self.git();
        cmd.args(["pack-refs", "--all", "--prune"]);
        self.run(cmd, "git pack-refs").map(|_| ())
    }
}

/// Artifacts produced by one `pack-objects` run.
struct StagedPack {
    // Keeps the staging directory alive until the writer is dropped.
    _dir: tempfile::TempDir,
    id: PackId,
    object_count: u64,
    pack: PathBuf,
    idx: PathBuf,
    bitmap: Option<PathBuf>,
}

/// Pack writer that stages artifacts through `git pack-objects`.
struct GitCliPackWriter {
    layout: RepoLayout,
    staged: Option<StagedPack>,
}

impl GitCliPackWriter {
    fn staged(&self) -> Result<&StagedPack, GitError> {
        self.staged
            .as_ref()
            .ok_or_else(|| GitError::backend("pack writer not prepared"))
    }

    fn copy_artifact(path: &Path, out: &mut dyn std::io::Write) -> Result<(), GitError> {
        let mut file = File::open(path)?;
        std::io::copy(&mut file, out)?;
        Ok(())
    }
}

impl PackWriter for GitCliPackWriter {
    fn prepare(
        &mut self,
        request: &PackRequest,
        _progress: &dyn ProgressMonitor,
    ) -> Result<u64, GitError> {
        if request.want.is_empty() {
            return Ok(0);
        }

        fs::create_dir_all(&self.layout.pack_dir)?;
        let staging_dir = tempfile::Builder::new()
            .prefix("ghs-staging-")
            .tempdir_in(&self.layout.pack_dir)?;
        let base = staging_dir.path().join("pack");

        let mut cmd = Command::new("git");
        cmd.arg("--git-dir")
            .arg(&self.layout.repo_dir)
            .args(["pack-objects", "--revs", "--delta-base-offset", "--quiet"]);
        if request.create_bitmap {
            cmd.arg("--write-bitmap-index");
        }
        if !request.exclude_packs.is_empty() {
            cmd.arg("--honor-pack-keep");
        }
        cmd.arg(&base);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(?cmd, "running git pack-objects");
        let mut child = cmd.spawn()?;
        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| GitError::backend("pack-objects stdin unavailable"))?;
            for want in &request.want {
                writeln!(stdin, "{want}")?;
            }
            for have in &request.have {
                writeln!(stdin, "^{have}")?;
            }
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(GitError::backend(format!(
                "git pack-objects failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hex = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| GitError::backend("pack-objects reported no pack name"))?;
        let id = PackId::from_hex(hex).ok_or_else(|| {
            GitError::backend(format!("pack-objects reported malformed pack name {hex:?}"))
        })?;

        let named = |ext: PackExt| {
            staging_dir
                .path()
                .join(format!("pack-{id}.{}", ext.extension()))
        };
        let pack = named(PackExt::Pack);
        let idx = named(PackExt::Index);
        let bitmap = Some(named(PackExt::Bitmap)).filter(|p| p.is_file());
        let object_count = pack_object_count(&pack)?;

        if bitmap.is_none() && request.create_bitmap {
            warn!(pack = %id, "pack-objects did not produce a bitmap index");
        }

        self.staged = Some(StagedPack {
            _dir: staging_dir,
            id,
            object_count,
            pack,
            idx,
            bitmap,
        });
        Ok(object_count)
    }

    fn id(&self) -> Result<PackId, GitError> {
        Ok(self.staged()?.id)
    }

    fn write_pack(
        &mut self,
        out: &mut dyn std::io::Write,
        _progress: &dyn ProgressMonitor,
    ) -> Result<(), GitError> {
        let staged = self.staged()?;
        Self::copy_artifact(&staged.pack, out)
    }

    fn write_index(&mut self, out: &mut dyn std::io::Write) -> Result<(), GitError> {
        let staged = self.staged()?;
        Self::copy_artifact(&staged.idx, out)
    }

    fn prepare_bitmap(&mut self, _progress: &dyn ProgressMonitor) -> Result<bool, GitError> {
        Ok(self.staged()?.bitmap.is_some())
    }

    fn write_bitmap(&mut self, out: &mut dyn std::io::Write) -> Result<(), GitError> {
        let staged = self.staged()?;
        let bitmap = staged
            .bitmap
            .as_ref()
            .ok_or_else(|| GitError::backend("no bitmap index was produced"))?;
        Self::copy_artifact(bitmap, out)
    }
}

/// Reads the object count from a pack file header.
///
/// Layout: `PACK` magic, 4-byte version, 4-byte big-endian object count.
fn pack_object_count(pack_path: &Path) -> Result<u64, GitError> {
    let mut header = [0u8; 12];
    let mut file = File::open(pack_path)?;
    file.read_exact(&mut header).map_err(|_| GitError::Corrupt {
        detail: format!("short pack header in {}", pack_path.display()),
    })?;
    if &header[0..4] != b"PACK" {
        return Err(GitError::Corrupt {
            detail: format!("bad pack magic in {}", pack_path.display()),
        });
    }
    let count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    Ok(u64::from(count))
}
