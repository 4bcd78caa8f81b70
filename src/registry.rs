//! Assignment registry: the entry point callers use to log time.
//!
//! The registry locates an assignment, takes that assignment's lock from its
//! [`LockTable`], asks the ledger to transition, and persists the result
//! through the store. Mutations on one id are serialized in lock acquisition
//! order; different ids never wait on each other. Eligibility checks take the
//! shared side of the same lock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::assignment::{Assignment, Eligibility, LogEntry};
use crate::catalog::TaskDirectory;
use crate::error::Result;
use crate::lock::{LockTable, DEFAULT_LOCK_TIMEOUT_MS};
use crate::storage::AssignmentStore;

/// Snapshot of an assignment as handed to callers for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentView {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user: String,
    pub allowed: bool,
    pub max_workload: Duration,
    pub current_workload: Duration,
    pub logging: bool,
    pub current_log: LogEntry,
    pub archived_log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Assignment> for AssignmentView {
    fn from(assignment: &Assignment) -> Self {
        Self {
            id: assignment.id,
            task_id: assignment.task_id,
            user: assignment.user.clone(),
            allowed: assignment.allowed,
            max_workload: assignment.max_workload,
            current_workload: assignment.current_workload(),
            logging: assignment.is_logging(),
            current_log: assignment.current_log().to_entry(),
            archived_log: assignment.archived_log().to_vec(),
            created_at: assignment.created_at,
            updated_at: assignment.updated_at,
        }
    }
}

impl AssignmentView {
    /// Workload left under the cap, or `None` when uncapped.
    pub fn remaining_workload(&self) -> Option<Duration> {
        (!self.max_workload.is_zero())
            .then(|| self.max_workload.saturating_sub(self.current_workload))
    }
}

/// Input for [`AssignmentRegistry::assign`]
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub task_id: Uuid,
    pub user: String,
    pub max_workload: Duration,
    pub allowed: bool,
}

pub struct AssignmentRegistry<S, D> {
    store: S,
    tasks: D,
    locks: LockTable,
    lock_timeout: Duration,
}

impl<S, D> AssignmentRegistry<S, D>
where
    S: AssignmentStore,
    D: TaskDirectory,
{
    pub fn new(store: S, tasks: D) -> Self {
        Self {
            store,
            tasks,
            locks: LockTable::new(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tasks(&self) -> &D {
        &self.tasks
    }

    // =========================================================================
    // Worklog operations
    // =========================================================================

    pub fn start_worklog(
        &self,
        id: &Uuid,
        user: &str,
        notes: Option<&str>,
    ) -> Result<(AssignmentView, bool)> {
        self.start_worklog_at(id, user, notes, Utc::now())
    }

    pub fn start_worklog_at(
        &self,
        id: &Uuid,
        user: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(AssignmentView, bool)> {
        let (view, started) = self.mutate(id, |assignment, tasks| {
            let status = tasks.task_status(&assignment.task_id)?;
            Ok(assignment.start_log_time_at(user, status, notes, now))
        })?;
        if started {
            tracing::info!(assignment = %id, user, "worklog started");
        } else {
            tracing::debug!(assignment = %id, user, "worklog start refused");
        }
        Ok((view, started))
    }

    pub fn stop_worklog(
        &self,
        id: &Uuid,
        user: &str,
        notes: Option<&str>,
    ) -> Result<(AssignmentView, bool)> {
        self.stop_worklog_at(id, user, notes, Utc::now())
    }

    pub fn stop_worklog_at(
        &self,
        id: &Uuid,
        user: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(AssignmentView, bool)> {
        let (view, stopped) = self.mutate(id, |assignment, tasks| {
            let status = tasks.task_status(&assignment.task_id)?;
            Ok(assignment.stop_log_time_at(user, status, notes, now))
        })?;
        if stopped {
            tracing::info!(
                assignment = %id,
                user,
                workload_secs = view.current_workload.as_secs(),
                "worklog stopped"
            );
        } else {
            tracing::debug!(assignment = %id, user, "worklog stop refused");
        }
        Ok((view, stopped))
    }

    pub fn log_manual_time(
        &self,
        id: &Uuid,
        user: &str,
        time: Duration,
        notes: Option<&str>,
    ) -> Result<(AssignmentView, bool)> {
        self.log_manual_time_at(id, user, time, notes, Utc::now())
    }

    pub fn log_manual_time_at(
        &self,
        id: &Uuid,
        user: &str,
        time: Duration,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(AssignmentView, bool)> {
        self.mutate(id, |assignment, tasks| {
            let status = tasks.task_status(&assignment.task_id)?;
            Ok(assignment.log_manual_time_at(user, status, time, notes, now))
        })
    }

    pub fn can_log(&self, id: &Uuid, user: &str) -> Result<bool> {
        Ok(self.eligibility(id, user)?.is_allowed())
    }

    /// Which logging condition, if any, currently blocks `user`.
    pub fn eligibility(&self, id: &Uuid, user: &str) -> Result<Eligibility> {
        let _guard = self.locks.read(*id, self.lock_timeout)?;
        let assignment = self.store.load(id)?;
        let status = self.tasks.task_status(&assignment.task_id)?;
        Ok(assignment.eligibility(user, status))
    }

    // =========================================================================
    // Assignment administration
    // =========================================================================

    /// Bind a user to a task. The task must exist.
    pub fn assign(&self, input: NewAssignment) -> Result<AssignmentView> {
        self.tasks.task_status(&input.task_id)?;
        let assignment = Assignment::new(input.task_id, input.user)
            .with_max_workload(input.max_workload)
            .with_allowed(input.allowed);
        let stored = self.store.insert(assignment)?;
        tracing::info!(assignment = %stored.id, task = %stored.task_id, user = %stored.user, "assignment created");
        Ok(AssignmentView::from(&stored))
    }

    pub fn get(&self, id: &Uuid) -> Result<AssignmentView> {
        let _guard = self.locks.read(*id, self.lock_timeout)?;
        Ok(AssignmentView::from(&self.store.load(id)?))
    }

    pub fn list(&self) -> Result<Vec<AssignmentView>> {
        Ok(self.store.list()?.iter().map(AssignmentView::from).collect())
    }

    /// Only the assignments bound to `user`.
    pub fn assignments_for(&self, user: &str) -> Result<Vec<AssignmentView>> {
        Ok(self
            .store
            .list()?
            .iter()
            .filter(|a| a.user == user)
            .map(AssignmentView::from)
            .collect())
    }

    pub fn set_allowed(&self, id: &Uuid, allowed: bool) -> Result<(AssignmentView, bool)> {
        let now = Utc::now();
        self.mutate(id, |assignment, _| Ok(assignment.set_allowed(allowed, now)))
    }

    pub fn set_max_workload(&self, id: &Uuid, max_workload: Duration) -> Result<(AssignmentView, bool)> {
        let now = Utc::now();
        self.mutate(id, |assignment, _| Ok(assignment.set_max_workload(max_workload, now)))
    }

    pub fn remove(&self, id: &Uuid) -> Result<AssignmentView> {
        let _guard = self.locks.write(*id, self.lock_timeout)?;
        let removed = self.store.remove(id)?;
        tracing::info!(assignment = %id, "assignment removed");
        Ok(AssignmentView::from(&removed))
    }

    /// Cascade for a removed task: drop every assignment bound to it.
    pub fn remove_task_assignments(&self, task_id: &Uuid) -> Result<Vec<AssignmentView>> {
        let ids: Vec<Uuid> = self
            .store
            .list()?
            .into_iter()
            .filter(|a| a.task_id == *task_id)
            .map(|a| a.id)
            .collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            match self.remove(&id) {
                Ok(view) => removed.push(view),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }

    fn mutate<F>(&self, id: &Uuid, f: F) -> Result<(AssignmentView, bool)>
    where
        F: FnOnce(&mut Assignment, &D) -> Result<bool>,
    {
        let _guard = self.locks.write(*id, self.lock_timeout)?;
        let tasks = &self.tasks;
        let (assignment, changed) = self.store.update(id, |assignment| f(assignment, tasks))?;
        Ok((AssignmentView::from(&assignment), changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, NewProject, NewTask, TaskStatus};
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn registry() -> (AssignmentRegistry<MemoryStore, Catalog>, Uuid) {
        let mut catalog = Catalog::new();
        catalog
            .add_project(NewProject {
                title: "Internal".to_string(),
                ..Default::default()
            })
            .unwrap();
        let task = catalog
            .add_task(
                "internal",
                NewTask {
                    title: "Support".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        (AssignmentRegistry::new(MemoryStore::new(), catalog), task.id)
    }

    fn assign(registry: &AssignmentRegistry<MemoryStore, Catalog>, task_id: Uuid, user: &str) -> Uuid {
        registry
            .assign(NewAssignment {
                task_id,
                user: user.to_string(),
                max_workload: Duration::from_secs(2 * 3600),
                allowed: true,
            })
            .unwrap()
            .id
    }

    #[test]
    fn start_stop_through_registry() {
        let (registry, task_id) = registry();
        let id = assign(&registry, task_id, "alice");
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        assert!(registry.can_log(&id, "alice").unwrap());
        let (view, started) = registry.start_worklog_at(&id, "alice", Some("triage"), t0).unwrap();
        assert!(started);
        assert!(view.logging);
        assert_eq!(view.current_log.start, Some(t0));

        let (view, stopped) = registry
            .stop_worklog_at(&id, "alice", None, t0 + chrono::Duration::minutes(90))
            .unwrap();
        assert!(stopped);
        assert!(!view.logging);
        assert!(view.current_log.is_empty());
        assert_eq!(view.current_workload, Duration::from_secs(90 * 60));
        assert_eq!(view.remaining_workload(), Some(Duration::from_secs(30 * 60)));
        assert_eq!(registry.get(&id).unwrap(), view);
    }

    #[test]
    fn refusal_is_not_an_error() {
        let (registry, task_id) = registry();
        let id = assign(&registry, task_id, "alice");

        let (view, started) = registry.start_worklog(&id, "bob", None).unwrap();
        assert!(!started);
        assert!(!view.logging);
        assert_eq!(
            registry.eligibility(&id, "bob").unwrap(),
            Eligibility::WrongUser
        );

        let (_, stopped) = registry.stop_worklog(&id, "alice", None).unwrap();
        assert!(!stopped);
    }

    #[test]
    fn unknown_assignment_is_not_found() {
        let (registry, _) = registry();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.start_worklog(&missing, "alice", None),
            Err(Error::AssignmentNotFound(id)) if id == missing
        ));
        assert!(matches!(
            registry.can_log(&missing, "alice"),
            Err(Error::AssignmentNotFound(_))
        ));
    }

    #[test]
    fn assign_requires_known_task_and_unique_pair() {
        let (registry, task_id) = registry();
        assert!(matches!(
            registry.assign(NewAssignment {
                task_id: Uuid::new_v4(),
                user: "alice".to_string(),
                max_workload: Duration::ZERO,
                allowed: true,
            }),
            Err(Error::TaskNotFound(_))
        ));

        assign(&registry, task_id, "alice");
        assert!(matches!(
            registry.assign(NewAssignment {
                task_id,
                user: "alice".to_string(),
                max_workload: Duration::ZERO,
                allowed: true,
            }),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn worker_view_filters_by_user() {
        let (registry, task_id) = registry();
        assign(&registry, task_id, "alice");
        assign(&registry, task_id, "bob");

        let mine = registry.assignments_for("alice").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user, "alice");
        assert_eq!(registry.list().unwrap().len(), 2);
    }

    #[test]
    fn admin_changes_gate_logging() {
        let (registry, task_id) = registry();
        let id = assign(&registry, task_id, "alice");

        let (view, changed) = registry.set_allowed(&id, false).unwrap();
        assert!(changed);
        assert!(!view.allowed);
        assert_eq!(
            registry.eligibility(&id, "alice").unwrap(),
            Eligibility::LoggingDisabled
        );

        registry.set_allowed(&id, true).unwrap();
        registry.set_max_workload(&id, Duration::ZERO).unwrap();
        let (view, logged) = registry
            .log_manual_time(&id, "alice", Duration::from_secs(10 * 3600), None)
            .unwrap();
        assert!(logged);
        assert_eq!(view.remaining_workload(), None);
        assert!(registry.can_log(&id, "alice").unwrap());
    }

    #[test]
    fn cascade_removes_task_assignments() {
        let (registry, task_id) = registry();
        let a = assign(&registry, task_id, "alice");
        assign(&registry, task_id, "bob");

        let removed = registry.remove_task_assignments(&task_id).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(registry.list().unwrap().is_empty());
        assert!(matches!(registry.get(&a), Err(Error::AssignmentNotFound(_))));
    }

    #[test]
    fn busy_assignment_times_out() {
        let (registry, task_id) = registry();
        let id = assign(&registry, task_id, "alice");
        let registry = registry.with_lock_timeout(Duration::from_millis(30));

        let _held = registry.locks.write(id, Duration::from_millis(30)).unwrap();
        assert!(matches!(
            registry.stop_worklog(&id, "alice", None),
            Err(Error::LockTimeout(got)) if got == id
        ));
        assert!(matches!(
            registry.can_log(&id, "alice"),
            Err(Error::LockTimeout(_))
        ));
    }

    #[test]
    fn task_status_is_read_at_call_time() {
        let (mut registry, task_id) = registry();
        let id = assign(&registry, task_id, "alice");
        registry
            .tasks
            .set_task_status(&task_id.to_string(), TaskStatus::Finished)
            .unwrap();
        assert_eq!(
            registry.eligibility(&id, "alice").unwrap(),
            Eligibility::TaskNotStarted {
                status: TaskStatus::Finished
            }
        );
    }
}
