//! In-memory fakes for the repository contract.
//!
//! The fakes stand in for the external Git collaborator in unit tests:
//! refs, reflogs, config, and a pack writer that emits small deterministic
//! artifacts. File placement, locking, and renames still hit the real
//! filesystem.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use super::errors::GitError;
use super::object_id::{ObjectId, PackId, ID_RAW_LEN};
use super::pack_writer::{PackRequest, PackWriter};
use super::progress::ProgressMonitor;
use super::refs::{RefDatabase, RefRecord, ReflogEntry};
use super::repo::RepoLayout;
use super::repository::Repository;

/// Pack id produced by the fake writer unless overridden.
pub const SAMPLE_PACK_ID: PackId = PackId::from_raw([0x5a; ID_RAW_LEN]);

/// Fake repository with scripted refs, reflogs, and config.
pub struct FakeRepository {
    layout: RepoLayout,
    refs: Vec<RefRecord>,
    reflogs: HashMap<String, Vec<ReflogEntry>>,
    kept: Vec<PackId>,
    config: HashMap<String, String>,
    pack_id: PackId,
    last_request: Rc<RefCell<Option<PackRequest>>>,
}

impl FakeRepository {
    pub fn new(repo_dir: &Path) -> Self {
        Self {
            layout: RepoLayout::new(repo_dir),
            refs: Vec::new(),
            reflogs: HashMap::new(),
            kept: Vec::new(),
            config: HashMap::new(),
            pack_id: SAMPLE_PACK_ID,
            last_request: Rc::new(RefCell::new(None)),
        }
    }

    pub fn with_branch(mut self, name: &str, target: ObjectId) -> Self {
        self.refs.push(RefRecord {
            name: name.to_string(),
            target: Some(target),
            peeled: None,
            symbolic: false,
        });
        self
    }

    pub fn with_tag(mut self, name: &str, target: ObjectId, peeled: Option<ObjectId>) -> Self {
        self.refs.push(RefRecord {
            name: name.to_string(),
            target: Some(target),
            peeled,
            symbolic: false,
        });
        self
    }

    pub fn with_other(mut self, name: &str, target: ObjectId) -> Self {
        self.refs.push(RefRecord {
            name: name.to_string(),
            target: Some(target),
            peeled: None,
            symbolic: false,
        });
        self
    }

    pub fn with_symbolic(mut self, name: &str) -> Self {
        self.refs.push(RefRecord {
            name: name.to_string(),
            target: None,
            peeled: None,
            symbolic: true,
        });
        self
    }

    pub fn with_unborn(mut self, name: &str) -> Self {
        self.refs.push(RefRecord {
            name: name.to_string(),
            target: None,
            peeled: None,
            symbolic: false,
        });
        self
    }

    pub fn with_reflog(mut self, ref_name: &str, old_id: ObjectId, new_id: ObjectId) -> Self {
        self.reflogs
            .entry(ref_name.to_string())
            .or_default()
            .push(ReflogEntry { old_id, new_id });
        self
    }

    pub fn with_kept_pack(mut self, id: PackId) -> Self {
        self.kept.push(id);
        self
    }

    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.config.insert(key.to_string(), value.to_string());
        self
    }

    /// The request handed to the most recent pack writer.
    pub fn last_request(&self) -> Option<PackRequest> {
        self.last_request.borrow().clone()
    }
}

impl RefDatabase for FakeRepository {
    fn refs(&self) -> Result<Vec<RefRecord>, GitError> {
        Ok(self.refs.clone())
    }

    fn refs_by_prefix(&self, prefixes: &[String]) -> Result<Vec<RefRecord>, GitError> {
        Ok(self
            .refs
            .iter()
            .filter(|r| prefixes.iter().any(|p| r.name.starts_with(p.as_str())))
            .cloned()
            .collect())
    }

    fn reflog(&self, ref_name: &str) -> Result<Vec<ReflogEntry>, GitError> {
        Ok(self.reflogs.get(ref_name).cloned().unwrap_or_default())
    }
}

impl Repository for FakeRepository {
    fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    fn ref_database(&self) -> &dyn RefDatabase {
        self
    }

    fn new_pack_writer(&self) -> Result<Box<dyn PackWriter>, GitError> {
        Ok(Box::new(FakePackWriter {
            id: self.pack_id,
            prepared: None,
            request_slot: Rc::clone(&self.last_request),
        }))
    }

    fn kept_packs(&self) -> Result<Vec<PackId>, GitError> {
        Ok(self.kept.clone())
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        Ok(self.config.get(key).cloned())
    }

    fn garbage_collect(&self, _progress: &dyn ProgressMonitor) -> Result<(), GitError> {
        Ok(())
    }

    fn pack_refs(&self) -> Result<(), GitError> {
        Ok(())
    }
}

/// Writer that emits tiny deterministic artifacts.
struct FakePackWriter {
    id: PackId,
    prepared: Option<u64>,
    request_slot: Rc<RefCell<Option<PackRequest>>>,
}

impl FakePackWriter {
    fn want_set(&self) -> HashSet<ObjectId> {
        self.request_slot
            .borrow()
            .as_ref()
            .map(|r| r.want.clone())
            .unwrap_or_default()
    }
}

impl PackWriter for FakePackWriter {
    fn prepare(
        &mut self,
        request: &PackRequest,
        _progress: &dyn ProgressMonitor,
    ) -> Result<u64, GitError> {
        *self.request_slot.borrow_mut() = Some(request.clone());
        let count = request.want.len() as u64;
        self.prepared = Some(count);
        Ok(count)
    }

    fn id(&self) -> Result<PackId, GitError> {
        if self.prepared.is_none() {
            return Err(GitError::backend("pack writer not prepared"));
        }
        Ok(self.id)
    }

    fn write_pack(
        &mut self,
        out: &mut dyn Write,
        _progress: &dyn ProgressMonitor,
    ) -> Result<(), GitError> {
        out.write_all(b"PACK")?;
        out.write_all(self.id.raw())?;
        for oid in sorted(self.want_set()) {
            out.write_all(oid.raw())?;
        }
        Ok(())
    }

    fn write_index(&mut self, out: &mut dyn Write) -> Result<(), GitError> {
        out.write_all(b"IDX\0")?;
        out.write_all(self.id.raw())?;
        Ok(())
    }

    fn prepare_bitmap(&mut self, _progress: &dyn ProgressMonitor) -> Result<bool, GitError> {
        Ok(true)
    }

    fn write_bitmap(&mut self, out: &mut dyn Write) -> Result<(), GitError> {
        out.write_all(b"BITMAP\0")?;
        out.write_all(self.id.raw())?;
        Ok(())
    }
}

fn sorted(set: HashSet<ObjectId>) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = set.into_iter().collect();
    ids.sort();
    ids
}
