//! Projects and tasks.
//!
//! The catalog is the task-management side of worklog: it owns each task's
//! lifecycle status. Assignments only ever read that status through
//! [`TaskDirectory`]; nothing in the ledger writes it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// Task status
// =============================================================================

/// Lifecycle of a task. Only `started` permits logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Planned,
    #[default]
    Started,
    Hold,
    Finished,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Planned,
        TaskStatus::Started,
        TaskStatus::Hold,
        TaskStatus::Finished,
    ];

    pub fn permits_logging(&self) -> bool {
        matches!(self, TaskStatus::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Planned => "planned",
            TaskStatus::Started => "started",
            TaskStatus::Hold => "hold",
            TaskStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "planned" => Ok(TaskStatus::Planned),
            "started" => Ok(TaskStatus::Started),
            "hold" | "on_hold" | "on-hold" => Ok(TaskStatus::Hold),
            "finished" | "done" => Ok(TaskStatus::Finished),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid task status '{}'. Expected: planned, started, hold, finished",
                s
            ))),
        }
    }
}

/// Read-only status lookup used by the registry.
pub trait TaskDirectory {
    fn task_status(&self, task_id: &Uuid) -> Result<TaskStatus>;
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Catalog::add_project`]
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub owner: Option<String>,
}

/// Input for [`Catalog::add_task`]
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
}

/// All projects and tasks, persisted as one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&mut self, input: NewProject) -> Result<Project> {
        let title = non_empty_title(&input.title)?;
        if self
            .projects
            .iter()
            .any(|p| p.title == title && p.owner == input.owner)
        {
            return Err(Error::AlreadyExists(format!("project '{title}'")));
        }

        let slug = slugify(title);
        if slug.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "project title '{title}' has no characters usable in a slug"
            )));
        }
        if self.projects.iter().any(|p| p.slug == slug) {
            return Err(Error::AlreadyExists(format!("project slug '{slug}'")));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            slug,
            title: title.to_string(),
            description: input.description.trim().to_string(),
            owner: input.owner,
            created_at: now,
            updated_at: now,
        };
        self.projects.push(project.clone());
        Ok(project)
    }

    pub fn add_task(&mut self, project: &str, input: NewTask) -> Result<Task> {
        let project_id = self.find_project(project)?.id;
        let title = non_empty_title(&input.title)?;
        if self
            .tasks
            .iter()
            .any(|t| t.project_id == project_id && t.title == title)
        {
            return Err(Error::AlreadyExists(format!("task '{title}' in {project}")));
        }

        let slug = slugify(title);
        if slug.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "task title '{title}' has no characters usable in a slug"
            )));
        }
        if self.tasks.iter().any(|t| t.slug == slug) {
            return Err(Error::AlreadyExists(format!("task slug '{slug}'")));
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            project_id,
            slug,
            title: title.to_string(),
            description: input.description.trim().to_string(),
            status: input.status,
            created_at: now,
            updated_at: now,
        };
        self.tasks.push(task.clone());
        Ok(task)
    }

    /// Find a project by id or slug
    pub fn find_project(&self, selector: &str) -> Result<&Project> {
        let selector = selector.trim();
        let id = Uuid::parse_str(selector).ok();
        self.projects
            .iter()
            .find(|p| Some(p.id) == id || p.slug == selector)
            .ok_or_else(|| Error::ProjectNotFound(selector.to_string()))
    }

    /// Find a task by id or slug
    pub fn find_task(&self, selector: &str) -> Result<&Task> {
        let selector = selector.trim();
        let id = Uuid::parse_str(selector).ok();
        self.tasks
            .iter()
            .find(|t| Some(t.id) == id || t.slug == selector)
            .ok_or_else(|| Error::TaskNotFound(selector.to_string()))
    }

    pub fn task(&self, id: &Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    pub fn tasks_in<'a>(&'a self, project_id: &'a Uuid) -> impl Iterator<Item = &'a Task> {
        self.tasks.iter().filter(move |t| t.project_id == *project_id)
    }

    /// Change a task's lifecycle status. Returns the previous status.
    pub fn set_task_status(&mut self, selector: &str, status: TaskStatus) -> Result<TaskStatus> {
        let id = self.find_task(selector)?.id;
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(selector.to_string()))?;
        let previous = task.status;
        if previous != status {
            task.status = status;
            task.updated_at = Utc::now();
        }
        Ok(previous)
    }

    /// Remove a task. Callers cascade the removal to its assignments.
    pub fn remove_task(&mut self, selector: &str) -> Result<Task> {
        let id = self.find_task(selector)?.id;
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(selector.to_string()))?;
        Ok(self.tasks.remove(index))
    }
}

impl TaskDirectory for Catalog {
    fn task_status(&self, task_id: &Uuid) -> Result<TaskStatus> {
        self.task(task_id)
            .map(|t| t.status)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }
}

fn non_empty_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidArgument("title cannot be empty".to_string()));
    }
    Ok(title)
}

/// Lowercase, alphanumerics kept (unicode included), runs of anything else
/// collapsed to a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.trim().chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_task() -> (Catalog, Task) {
        let mut catalog = Catalog::new();
        catalog
            .add_project(NewProject {
                title: "Website Relaunch".to_string(),
                ..Default::default()
            })
            .unwrap();
        let task = catalog
            .add_task(
                "website-relaunch",
                NewTask {
                    title: "Design mockups".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        (catalog, task)
    }

    #[test]
    fn status_parse_and_display() {
        for status in TaskStatus::ALL {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!("HOLD".parse::<TaskStatus>().unwrap(), TaskStatus::Hold);
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn only_started_permits_logging() {
        assert!(TaskStatus::Started.permits_logging());
        assert!(!TaskStatus::Planned.permits_logging());
        assert!(!TaskStatus::Hold.permits_logging());
        assert!(!TaskStatus::Finished.permits_logging());
        assert_eq!(TaskStatus::default(), TaskStatus::Started);
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Website Relaunch"), "website-relaunch");
        assert_eq!(slugify("  API -- v2!  "), "api-v2");
        assert_eq!(slugify("Größe prüfen"), "größe-prüfen");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn tasks_found_by_slug_or_id() {
        let (catalog, task) = catalog_with_task();
        assert_eq!(catalog.find_task("design-mockups").unwrap().id, task.id);
        assert_eq!(catalog.find_task(&task.id.to_string()).unwrap().slug, task.slug);
        assert!(matches!(
            catalog.find_task("missing"),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn duplicate_titles_rejected() {
        let (mut catalog, _) = catalog_with_task();
        let err = catalog
            .add_task(
                "website-relaunch",
                NewTask {
                    title: "Design mockups".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = catalog
            .add_project(NewProject {
                title: "Website Relaunch".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn unknown_project_rejected() {
        let mut catalog = Catalog::new();
        let err = catalog
            .add_task(
                "nope",
                NewTask {
                    title: "x".to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(_)));
    }

    #[test]
    fn status_changes_visible_through_directory() {
        let (mut catalog, task) = catalog_with_task();
        assert_eq!(catalog.task_status(&task.id).unwrap(), TaskStatus::Started);

        let previous = catalog.set_task_status("design-mockups", TaskStatus::Hold).unwrap();
        assert_eq!(previous, TaskStatus::Started);
        assert_eq!(catalog.task_status(&task.id).unwrap(), TaskStatus::Hold);

        catalog.remove_task("design-mockups").unwrap();
        assert!(matches!(
            catalog.task_status(&task.id),
            Err(Error::TaskNotFound(_))
        ));
    }
}
