//! Storage backends for plan documents.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::workflow::{PlanId, RoutingPlan};
use crate::{clog_debug, clog_trace, Result};

use super::migration::PlanDocument;

const PLAN_FILE: &str = "plan.json";
const LOCK_FILE: &str = "plan.lock";
const HISTORY_DIR: &str = "history";

/// Exclusive advisory lock on a workspace's `plan.lock`, held until drop.
///
/// Every process that follows the same workspace takes this lock around its
/// load-mutate-save, so concurrent `conductor complete` calls queue instead
/// of overwriting each other.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
}

impl WorkspaceLock {
    /// Block until the lock on `path` is ours.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.lock()?;
        clog_trace!("Acquired {}", path.display());
        Ok(Self { file })
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Where one workspace's plan document lives.
///
/// `PlanStore` serializes access within a process and calls
/// [`lock`](PlanBackend::lock) to serialize it across processes.
pub trait PlanBackend: Send {
    /// Workspace key written into new documents.
    fn workspace(&self) -> &str;

    /// Cross-process lock for one critical section. Backends that only live
    /// in one process have none.
    fn lock(&self) -> Result<Option<WorkspaceLock>> {
        Ok(None)
    }

    /// Current document, or an empty one if nothing was saved yet.
    fn load(&mut self) -> Result<PlanDocument>;

    fn save(&mut self, doc: &PlanDocument) -> Result<()>;

    /// Remove the active document.
    fn clear(&mut self) -> Result<()>;

    /// Keep a finished plan out of the active slot.
    fn archive(&mut self, plan: &RoutingPlan) -> Result<()>;

    fn load_archived(&mut self, id: &PlanId) -> Result<Option<RoutingPlan>>;
}

/// JSON files under a workspace state directory:
/// `plan.json`, `plan.json.bak` and `history/<planId>.json`.
pub struct JsonFileBackend {
    dir: PathBuf,
    workspace: String,
}

impl JsonFileBackend {
    pub fn new(dir: &Path, workspace: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            workspace: workspace.to_string(),
        }
    }

    pub fn plan_path(&self) -> PathBuf {
        self.dir.join(PLAN_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.dir.join(HISTORY_DIR)
    }

    fn archive_path(&self, id: &PlanId) -> PathBuf {
        self.history_dir().join(format!("{}.json", id))
    }

    /// Write through a temp file in the same directory and rename over
    /// `path`, so readers never see a torn document.
    fn write_atomic(path: &Path, contents: &str) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        if !dir.exists() {
            clog_debug!("Creating state directory: {}", dir.display());
            fs::create_dir_all(dir)?;
        }
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }
}

impl PlanBackend for JsonFileBackend {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn lock(&self) -> Result<Option<WorkspaceLock>> {
        WorkspaceLock::acquire(&self.lock_path()).map(Some)
    }

    fn load(&mut self) -> Result<PlanDocument> {
        let path = self.plan_path();
        if !path.exists() {
            clog_debug!("No plan document at {}, starting empty", path.display());
            return Ok(PlanDocument::new(&self.workspace));
        }
        let contents = fs::read_to_string(&path)?;
        clog_trace!("Loaded {}: {}", path.display(), contents);
        PlanDocument::from_json(&contents, &self.workspace)
    }

    fn save(&mut self, doc: &PlanDocument) -> Result<()> {
        let path = self.plan_path();
        if path.exists() {
            let backup = path.with_extension("json.bak");
            fs::copy(&path, &backup)?;
        }
        let contents = doc.to_json()?;
        Self::write_atomic(&path, &contents)?;
        clog_debug!("Plan document saved: {}", path.display());
        clog_trace!("Saved {}: {}", path.display(), contents);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let path = self.plan_path();
        if path.exists() {
            fs::remove_file(&path)?;
            clog_debug!("Plan document removed: {}", path.display());
        }
        Ok(())
    }

    fn archive(&mut self, plan: &RoutingPlan) -> Result<()> {
        let path = self.archive_path(&plan.plan_id);
        Self::write_atomic(&path, &serde_json::to_string_pretty(plan)?)?;
        clog_debug!("Plan {} archived to {}", plan.plan_id.short(), path.display());
        Ok(())
    }

    fn load_archived(&mut self, id: &PlanId) -> Result<Option<RoutingPlan>> {
        let path = self.archive_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let mut plan: RoutingPlan = serde_json::from_str(&fs::read_to_string(&path)?)?;
        plan.rebuild_index();
        Ok(Some(plan))
    }
}

/// In-process backend for tests and embedding.
pub struct MemoryBackend {
    workspace: String,
    doc: Option<PlanDocument>,
    archived: HashMap<PlanId, RoutingPlan>,
    read_only: bool,
}

impl MemoryBackend {
    pub fn new(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            doc: None,
            archived: HashMap::new(),
            read_only: false,
        }
    }

    /// Make every later write fail with a permission error.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "memory backend is read-only",
            )
            .into());
        }
        Ok(())
    }
}

impl PlanBackend for MemoryBackend {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn load(&mut self) -> Result<PlanDocument> {
        Ok(self
            .doc
            .clone()
            .unwrap_or_else(|| PlanDocument::new(&self.workspace)))
    }

    fn save(&mut self, doc: &PlanDocument) -> Result<()> {
        self.check_writable()?;
        self.doc = Some(doc.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        self.doc = None;
        Ok(())
    }

    fn archive(&mut self, plan: &RoutingPlan) -> Result<()> {
        self.check_writable()?;
        self.archived.insert(plan.plan_id, plan.clone());
        Ok(())
    }

    fn load_archived(&mut self, id: &PlanId) -> Result<Option<RoutingPlan>> {
        Ok(self.archived.get(id).cloned())
    }
}
