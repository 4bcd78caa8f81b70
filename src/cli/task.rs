//! worklog task command implementations.
//!
//! Tasks live in the catalog document. Removing a task also removes every
//! assignment bound to it.

use crate::catalog::{NewTask, Task, TaskStatus};
use crate::cli::{GlobalOptions, Workspace};
use crate::error::Result;
use crate::output::{emit_success, Report};
use crate::registry::AssignmentView;

pub struct NewOptions {
    pub project: String,
    pub title: String,
    pub description: String,
    pub status: Option<String>,
    pub globals: GlobalOptions,
}

pub struct ListOptions {
    pub project: Option<String>,
    pub globals: GlobalOptions,
}

pub struct StatusOptions {
    pub task: String,
    pub status: String,
    pub globals: GlobalOptions,
}

pub struct RmOptions {
    pub task: String,
    pub globals: GlobalOptions,
}

#[derive(serde::Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(serde::Serialize)]
struct TaskStatusOutput {
    task: Task,
    previous: TaskStatus,
    changed: bool,
}

#[derive(serde::Serialize)]
struct TaskRemoveOutput {
    task: Task,
    removed_assignments: Vec<AssignmentView>,
}

pub fn run_new(options: NewOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let status = match options.status.as_deref() {
        Some(raw) => raw.parse()?,
        None => ws.config.tasks.status()?,
    };

    let task = ws.storage.update_catalog(|catalog| {
        catalog.add_task(
            &options.project,
            NewTask {
                title: options.title.clone(),
                description: options.description.clone(),
                status,
            },
        )
    })?;
    tracing::info!(task = %task.id, slug = %task.slug, %status, "task created");

    let mut human = Report::new("Task created");
    human.field("ID", task.id.to_string());
    human.field("Slug", task.slug.clone());
    human.field("Title", task.title.clone());
    human.field("Status", task.status.to_string());
    if !task.status.permits_logging() {
        human.warn(format!(
            "task is {}; time can only be logged on started tasks",
            task.status
        ));
    }
    human.next_step(format!("worklog assign {} <user>", task.slug));

    emit_success(options.globals.output(), "task new", &task, Some(&human))
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let catalog = ws.storage.read_catalog()?;

    let tasks: Vec<Task> = match options.project.as_deref() {
        Some(selector) => {
            let project_id = catalog.find_project(selector)?.id;
            catalog.tasks_in(&project_id).cloned().collect()
        }
        None => catalog.tasks.clone(),
    };
    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };

    let mut human = Report::new("Tasks");
    human.field("Total", output.total.to_string());
    for task in &output.tasks {
        human.row(format!("{} [{}] {}", task.slug, task.status, task.title));
    }

    emit_success(options.globals.output(), "task ls", &output, Some(&human))
}

pub fn run_status(options: StatusOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let status: TaskStatus = options.status.parse()?;

    let (previous, task) = ws.storage.update_catalog(|catalog| {
        let previous = catalog.set_task_status(&options.task, status)?;
        let task = catalog.find_task(&options.task)?.clone();
        Ok((previous, task))
    })?;
    let changed = previous != status;
    if changed {
        tracing::info!(task = %task.id, from = %previous, to = %status, "task status changed");
    }

    let mut human = Report::new(if changed {
        "Task status updated".to_string()
    } else {
        "No task changes".to_string()
    });
    human.field("Task", task.slug.clone());
    human.field("Status", format!("{previous} -> {status}"));

    let output = TaskStatusOutput {
        task,
        previous,
        changed,
    };
    emit_success(options.globals.output(), "task status", &output, Some(&human))
}

pub fn run_rm(options: RmOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;

    // Catalog lock is released before the cascade takes assignment locks.
    let task = ws
        .storage
        .update_catalog(|catalog| catalog.remove_task(&options.task))?;
    let removed_assignments = ws.registry().remove_task_assignments(&task.id)?;
    tracing::info!(task = %task.id, assignments = removed_assignments.len(), "task removed");

    let mut human = Report::new("Task removed");
    human.field("Task", task.slug.clone());
    human.field("Assignments removed", removed_assignments.len().to_string());

    let output = TaskRemoveOutput {
        task,
        removed_assignments,
    };
    emit_success(options.globals.output(), "task rm", &output, Some(&human))
}
