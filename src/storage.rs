//! Storage layer for worklog
//!
//! [`AssignmentStore`] is what the registry needs from persistence: load a
//! record, and read-modify-write it atomically. Two implementations:
//! - [`MemoryStore`]: a map in memory, for embedding and tests.
//! - [`Storage`]: JSON files under `.worklog/`, one per assignment, guarded by
//!   lock files so concurrent processes serialize per record.
//!
//! # Directory Structure
//!
//! ```text
//! <root>/
//!   .worklog.toml                 # Configuration
//!   .worklog/
//!     user                        # Persisted caller identity
//!     catalog.json                # Projects and tasks
//!     catalog.json.lock
//!     journal.json                # Journal entries and emotions
//!     journal.json.lock
//!     assignments/
//!       index.lock                # Held while creating (uniqueness check)
//!       <uuid>.json               # One assignment with its worklog archive
//!       <uuid>.lock
//! ```
//!
//! Every write of an assignment runs the persist hook
//! ([`Assignment::recompute_workload`]) first.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::assignment::Assignment;
use crate::catalog::{Catalog, TaskDirectory, TaskStatus};
use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

/// Name of the state directory under the worklog root
pub const STATE_DIR: &str = ".worklog";

/// Persistence contract used by the registry.
///
/// `update` is a read-modify-write of one record. Implementations must make
/// the write all-or-nothing: if it fails, later loads see the previous record.
pub trait AssignmentStore {
    fn load(&self, id: &Uuid) -> Result<Assignment>;

    fn list(&self) -> Result<Vec<Assignment>>;

    /// Store a new record. Rejects a second assignment for the same
    /// `(user, task)` pair.
    fn insert(&self, assignment: Assignment) -> Result<Assignment>;

    /// Apply `f` to the stored record. `f` reports whether it changed the
    /// record; unchanged records are not written. Returns the resulting
    /// record and the flag.
    fn update<F>(&self, id: &Uuid, f: F) -> Result<(Assignment, bool)>
    where
        F: FnOnce(&mut Assignment) -> Result<bool>;

    fn remove(&self, id: &Uuid) -> Result<Assignment>;
}

fn duplicate_error(assignment: &Assignment) -> Error {
    Error::AlreadyExists(format!(
        "assignment of {} to task {}",
        assignment.user, assignment.task_id
    ))
}

// =============================================================================
// In-memory store
// =============================================================================

/// Assignments held in memory.
///
/// The map lock is only held to copy records in and out; `update` runs its
/// closure on a copy. Callers serialize updates per id (the registry does).
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, Assignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Assignment>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Assignment>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AssignmentStore for MemoryStore {
    fn load(&self, id: &Uuid) -> Result<Assignment> {
        self.read()
            .get(id)
            .cloned()
            .ok_or(Error::AssignmentNotFound(*id))
    }

    fn list(&self) -> Result<Vec<Assignment>> {
        let mut records: Vec<Assignment> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn insert(&self, mut assignment: Assignment) -> Result<Assignment> {
        let mut records = self.write();
        if records.contains_key(&assignment.id)
            || records
                .values()
                .any(|a| a.user == assignment.user && a.task_id == assignment.task_id)
        {
            return Err(duplicate_error(&assignment));
        }
        assignment.recompute_workload();
        records.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    fn update<F>(&self, id: &Uuid, f: F) -> Result<(Assignment, bool)>
    where
        F: FnOnce(&mut Assignment) -> Result<bool>,
    {
        let mut record = self.load(id)?;
        let changed = f(&mut record)?;
        if changed {
            record.recompute_workload();
            let mut records = self.write();
            if !records.contains_key(id) {
                return Err(Error::AssignmentNotFound(*id));
            }
            records.insert(*id, record.clone());
        }
        Ok((record, changed))
    }

    fn remove(&self, id: &Uuid) -> Result<Assignment> {
        self.write()
            .remove(id)
            .ok_or(Error::AssignmentNotFound(*id))
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Storage manager for the `.worklog/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    /// Directory holding `.worklog.toml` and `.worklog/`
    root: PathBuf,
    lock_timeout_ms: u64,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the `.worklog/` directory
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Path to the persisted user identity
    pub fn user_file(&self) -> PathBuf {
        self.state_dir().join("user")
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.state_dir().join("catalog.json")
    }

    fn catalog_lock(&self) -> PathBuf {
        self.state_dir().join("catalog.json.lock")
    }

    pub fn journal_file(&self) -> PathBuf {
        self.state_dir().join("journal.json")
    }

    fn journal_lock(&self) -> PathBuf {
        self.state_dir().join("journal.json.lock")
    }

    pub fn assignments_dir(&self) -> PathBuf {
        self.state_dir().join("assignments")
    }

    pub fn assignment_file(&self, id: &Uuid) -> PathBuf {
        self.assignments_dir().join(format!("{id}.json"))
    }

    fn assignment_lock(&self, id: &Uuid) -> PathBuf {
        self.assignments_dir().join(format!("{id}.lock"))
    }

    fn index_lock(&self) -> PathBuf {
        self.assignments_dir().join("index.lock")
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create the `.worklog/` layout and an empty catalog
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.assignments_dir())?;

        let catalog_file = self.catalog_file();
        if !catalog_file.exists() {
            self.write_json(&catalog_file, &Catalog::default())?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir().exists()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "no worklog state in {} (run `worklog init`)",
                self.root.display()
            )))
        }
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON data atomically (write to temp, then rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    // =========================================================================
    // Catalog (locked)
    // =========================================================================

    pub fn read_catalog(&self) -> Result<Catalog> {
        self.read_document(&self.catalog_file(), self.catalog_lock())
    }

    pub fn update_catalog<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Catalog) -> Result<T>,
    {
        self.update_document(&self.catalog_file(), self.catalog_lock(), f)
    }

    // =========================================================================
    // Journal (locked)
    // =========================================================================

    pub fn read_journal(&self) -> Result<Journal> {
        self.read_document(&self.journal_file(), self.journal_lock())
    }

    pub fn update_journal<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Journal) -> Result<T>,
    {
        self.update_document(&self.journal_file(), self.journal_lock(), f)
    }

    /// Shared-locked read of a whole-file document; a missing file is empty.
    fn read_document<D>(&self, path: &Path, lock: PathBuf) -> Result<D>
    where
        D: DeserializeOwned + Default,
    {
        self.ensure_initialized()?;
        let _lock = FileLock::acquire_shared(lock, self.lock_timeout_ms)?;
        if !path.exists() {
            return Ok(D::default());
        }
        self.read_json(path)
    }

    /// Exclusive read-modify-write of a whole-file document. Nothing is
    /// written when `f` fails.
    fn update_document<D, T, F>(&self, path: &Path, lock: PathBuf, f: F) -> Result<T>
    where
        D: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut D) -> Result<T>,
    {
        self.ensure_initialized()?;
        let _lock = FileLock::acquire(lock, self.lock_timeout_ms)?;

        let mut document = if path.exists() {
            self.read_json(path)?
        } else {
            D::default()
        };

        let result = f(&mut document)?;
        self.write_json(path, &document)?;
        Ok(result)
    }

    fn read_assignment(&self, id: &Uuid) -> Result<Assignment> {
        let path = self.assignment_file(id);
        if !path.exists() {
            return Err(Error::AssignmentNotFound(*id));
        }
        let mut record: Assignment = self.read_json(&path)?;
        if record.id != *id {
            return Err(Error::Persistence(format!(
                "{} holds assignment {}",
                path.display(),
                record.id
            )));
        }
        // Files can be edited by hand; never trust the stored total.
        record.recompute_workload();
        Ok(record)
    }

    fn write_assignment(&self, record: &mut Assignment) -> Result<()> {
        record.recompute_workload();
        tracing::debug!(assignment = %record.id, entries = record.archived_log().len(), "writing assignment");
        self.write_json(&self.assignment_file(&record.id), record)
    }
}

impl AssignmentStore for Storage {
    fn load(&self, id: &Uuid) -> Result<Assignment> {
        self.ensure_initialized()?;
        let _lock = FileLock::acquire_shared(self.assignment_lock(id), self.lock_timeout_ms)?;
        self.read_assignment(id)
    }

    fn list(&self) -> Result<Vec<Assignment>> {
        self.ensure_initialized()?;
        let dir = self.assignments_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            let _lock = FileLock::acquire_shared(self.assignment_lock(&id), self.lock_timeout_ms)?;
            match self.read_assignment(&id) {
                Ok(record) => records.push(record),
                // Removed between read_dir and the lock.
                Err(Error::AssignmentNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn insert(&self, mut assignment: Assignment) -> Result<Assignment> {
        self.ensure_initialized()?;
        let _index = FileLock::acquire(self.index_lock(), self.lock_timeout_ms)?;

        let existing = self.list()?;
        if existing.iter().any(|a| {
            a.id == assignment.id || (a.user == assignment.user && a.task_id == assignment.task_id)
        }) {
            return Err(duplicate_error(&assignment));
        }

        let _lock = FileLock::acquire(self.assignment_lock(&assignment.id), self.lock_timeout_ms)?;
        self.write_assignment(&mut assignment)?;
        Ok(assignment)
    }

    fn update<F>(&self, id: &Uuid, f: F) -> Result<(Assignment, bool)>
    where
        F: FnOnce(&mut Assignment) -> Result<bool>,
    {
        self.ensure_initialized()?;
        let _lock = FileLock::acquire(self.assignment_lock(id), self.lock_timeout_ms)?;

        let mut record = self.read_assignment(id)?;
        let changed = f(&mut record)?;
        if changed {
            self.write_assignment(&mut record)?;
        }
        Ok((record, changed))
    }

    fn remove(&self, id: &Uuid) -> Result<Assignment> {
        self.ensure_initialized()?;
        let lock_path = self.assignment_lock(id);
        let _lock = FileLock::acquire(&lock_path, self.lock_timeout_ms)?;

        let record = self.read_assignment(id)?;
        fs::remove_file(self.assignment_file(id))?;
        let _ = fs::remove_file(&lock_path);
        Ok(record)
    }
}

impl TaskDirectory for Storage {
    fn task_status(&self, task_id: &Uuid) -> Result<TaskStatus> {
        self.read_catalog()?.task_status(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NewProject, NewTask};
    use crate::journal::NewEntry;
    use std::time::Duration;
    use tempfile::TempDir;

    fn storage() -> (TempDir, Storage) {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().to_path_buf());
        storage.init().unwrap();
        (temp, storage)
    }

    #[test]
    fn test_storage_paths() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let storage = Storage::new(root.clone());
        let id = Uuid::new_v4();

        assert_eq!(storage.state_dir(), root.join(".worklog"));
        assert_eq!(storage.catalog_file(), root.join(".worklog/catalog.json"));
        assert_eq!(
            storage.assignment_file(&id),
            root.join(format!(".worklog/assignments/{id}.json"))
        );
        assert!(!storage.is_initialized());
    }

    #[test]
    fn init_creates_layout() {
        let (_temp, storage) = storage();
        assert!(storage.assignments_dir().exists());
        assert!(storage.catalog_file().exists());
        assert_eq!(storage.read_catalog().unwrap(), Catalog::default());
    }

    #[test]
    fn uninitialized_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::new(temp.path().to_path_buf());
        assert!(matches!(
            storage.load(&Uuid::new_v4()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn catalog_updates_persist() {
        let (_temp, storage) = storage();
        let task = storage
            .update_catalog(|catalog| {
                catalog.add_project(NewProject {
                    title: "Ops".to_string(),
                    ..Default::default()
                })?;
                catalog.add_task(
                    "ops",
                    NewTask {
                        title: "Patch servers".to_string(),
                        status: TaskStatus::Hold,
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        assert_eq!(storage.task_status(&task.id).unwrap(), TaskStatus::Hold);
    }

    #[test]
    fn failed_catalog_update_writes_nothing() {
        let (_temp, storage) = storage();
        let result: Result<()> = storage.update_catalog(|catalog| {
            catalog.add_project(NewProject {
                title: "Ops".to_string(),
                ..Default::default()
            })?;
            Err(Error::InvalidArgument("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(storage.read_catalog().unwrap().projects.is_empty());
    }

    #[test]
    fn journal_is_created_on_first_write() {
        let (_temp, storage) = storage();
        assert!(!storage.journal_file().exists());
        assert_eq!(storage.read_journal().unwrap(), Journal::default());

        storage
            .update_journal(|journal| {
                journal.add_entry(NewEntry {
                    user: "alice".to_string(),
                    text: "first".to_string(),
                    emotions: vec!["calm".to_string()],
                    ..Default::default()
                })
            })
            .unwrap();
        let failed: Result<()> = storage.update_journal(|journal| {
            journal.add_emotion("tired")?;
            Err(Error::InvalidArgument("abort".to_string()))
        });
        assert!(failed.is_err());

        let journal = storage.read_journal().unwrap();
        assert_eq!(journal.my_entries("alice").len(), 1);
        assert_eq!(journal.emotions.len(), 1);
        assert!(journal.emotion("tired").is_none());
    }

    #[test]
    fn file_store_round_trip_and_update() {
        let (_temp, storage) = storage();
        let inserted = storage
            .insert(Assignment::new(Uuid::new_v4(), "alice").with_max_workload(Duration::from_secs(7200)))
            .unwrap();

        let loaded = storage.load(&inserted.id).unwrap();
        assert_eq!(loaded, inserted);

        let (unchanged, changed) = storage.update(&inserted.id, |_| Ok(false)).unwrap();
        assert!(!changed);
        assert_eq!(unchanged, inserted);

        let (updated, changed) = storage
            .update(&inserted.id, |a| Ok(a.set_allowed(false, a.updated_at)))
            .unwrap();
        assert!(changed);
        assert!(!updated.allowed);
        assert!(!storage.load(&inserted.id).unwrap().allowed);
    }

    #[test]
    fn file_store_rejects_duplicate_pair() {
        let (_temp, storage) = storage();
        let task_id = Uuid::new_v4();
        storage.insert(Assignment::new(task_id, "alice")).unwrap();
        let err = storage.insert(Assignment::new(task_id, "alice")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        storage.insert(Assignment::new(task_id, "bob")).unwrap();
        assert_eq!(storage.list().unwrap().len(), 2);
    }

    #[test]
    fn file_store_remove_and_not_found() {
        let (_temp, storage) = storage();
        let a = storage.insert(Assignment::new(Uuid::new_v4(), "alice")).unwrap();
        storage.remove(&a.id).unwrap();
        assert!(matches!(storage.load(&a.id), Err(Error::AssignmentNotFound(_))));
        assert!(matches!(
            storage.update(&a.id, |_| Ok(true)),
            Err(Error::AssignmentNotFound(_))
        ));
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn load_recomputes_hand_edited_workload() {
        let (_temp, storage) = storage();
        let a = storage.insert(Assignment::new(Uuid::new_v4(), "alice")).unwrap();

        let path = storage.assignment_file(&a.id);
        let mut raw: serde_json::Value = storage.read_json(&path).unwrap();
        raw["current_workload"] = serde_json::json!({ "secs": 99_999, "nanos": 0 });
        storage.write_json(&path, &raw).unwrap();

        let loaded = storage.load(&a.id).unwrap();
        assert_eq!(loaded.current_workload(), Duration::ZERO);
    }

    #[test]
    fn load_survives_oversized_hand_edited_times() {
        let (_temp, storage) = storage();
        let a = storage.insert(Assignment::new(Uuid::new_v4(), "alice")).unwrap();

        let path = storage.assignment_file(&a.id);
        let mut raw: serde_json::Value = storage.read_json(&path).unwrap();
        let huge = serde_json::json!({
            "start": null,
            "stop": null,
            "time": { "secs": u64::MAX, "nanos": 0 },
            "notes": "",
            "completed": true
        });
        raw["archived_log"] = serde_json::json!([huge.clone(), huge]);
        storage.write_json(&path, &raw).unwrap();

        let loaded = storage.load(&a.id).unwrap();
        assert_eq!(loaded.current_workload(), Duration::MAX);
        assert_eq!(storage.list().unwrap().len(), 1);
    }

    #[test]
    fn memory_store_update_and_duplicates() {
        let store = MemoryStore::new();
        let task_id = Uuid::new_v4();
        let a = store.insert(Assignment::new(task_id, "alice")).unwrap();
        assert!(matches!(
            store.insert(Assignment::new(task_id, "alice")),
            Err(Error::AlreadyExists(_))
        ));

        let err = store
            .update(&a.id, |record| {
                record.allowed = false;
                Err(Error::Persistence("disk full".to_string()))
            })
            .unwrap_err();
        assert!(err.is_persistence());
        assert!(store.load(&a.id).unwrap().allowed);

        store.remove(&a.id).unwrap();
        assert!(matches!(store.load(&a.id), Err(Error::AssignmentNotFound(_))));
    }
}
