//! worklog assign / assignment command implementations.

use crate::assignment::parse_duration;
use crate::cli::{resolve_assignment_id, GlobalOptions, Workspace};
use crate::error::{Error, Result};
use crate::output::{emit_success, Report};
use crate::registry::{AssignmentView, NewAssignment};

pub struct AssignOptions {
    pub task: String,
    pub user: String,
    pub max_workload: Option<String>,
    pub disallow: bool,
    pub globals: GlobalOptions,
}

pub struct ListOptions {
    pub all: bool,
    pub globals: GlobalOptions,
}

pub struct ShowOptions {
    pub assignment: String,
    pub globals: GlobalOptions,
}

pub struct SetOptions {
    pub assignment: String,
    pub allowed: Option<bool>,
    pub max_workload: Option<String>,
    pub globals: GlobalOptions,
}

pub struct RmOptions {
    pub assignment: String,
    pub globals: GlobalOptions,
}

#[derive(serde::Serialize)]
struct AssignmentListOutput {
    /// `None` when listing every user
    user: Option<String>,
    total: usize,
    assignments: Vec<AssignmentView>,
}

#[derive(serde::Serialize)]
struct AssignmentChangeOutput {
    assignment: AssignmentView,
    changed: bool,
}

pub fn run_assign(options: AssignOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let user = options.user.trim();
    if user.is_empty() {
        return Err(Error::InvalidArgument("user cannot be empty".to_string()));
    }
    let max_workload = match options.max_workload.as_deref() {
        Some(raw) => parse_duration(raw)?,
        None => ws.config.assignments.max_workload()?,
    };
    let allowed = !options.disallow && ws.config.assignments.default_allowed;

    let task = ws.storage.read_catalog()?.find_task(&options.task)?.clone();
    let view = ws.registry().assign(NewAssignment {
        task_id: task.id,
        user: user.to_string(),
        max_workload,
        allowed,
    })?;

    let mut human = Report::new("Assignment created");
    human.field("ID", view.id.to_string());
    human.field("Task", task.slug.clone());
    human.field("User", view.user.clone());
    human.workload_cap(&view);
    human.field("Allowed", view.allowed.to_string());
    human.next_step(format!("worklog start {}", view.id));

    emit_success(options.globals.output(), "assign", &view, Some(&human))
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let registry = ws.registry();

    let (user, assignments) = if options.all {
        (None, registry.list()?)
    } else {
        let user = ws.user(&options.globals)?;
        let assignments = registry.assignments_for(&user)?;
        (Some(user), assignments)
    };
    let output = AssignmentListOutput {
        user,
        total: assignments.len(),
        assignments,
    };

    let header = match output.user.as_deref() {
        Some(user) => format!("Assignments for {user}"),
        None => "Assignments".to_string(),
    };
    let mut human = Report::new(header);
    human.field("Total", output.total.to_string());
    for view in &output.assignments {
        human.assignment_row(view);
    }

    emit_success(options.globals.output(), "assignment ls", &output, Some(&human))
}

pub fn run_show(options: ShowOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;
    let view = registry.get(&id)?;

    let mut human = Report::new(format!("Assignment {}", view.id));
    human.field("User", view.user.clone());
    human.field("Task", view.task_id.to_string());
    human.field("Allowed", view.allowed.to_string());
    human.workload(&view);
    human.workload_cap(&view);
    match view.current_log.start {
        Some(start) => human.field("Logging since", start.to_rfc3339()),
        None => human.field("Logging", "no"),
    }
    human.field("Entries", view.archived_log.len().to_string());
    if options.globals.verbose {
        human.entries(&view.archived_log);
    }

    emit_success(options.globals.output(), "assignment show", &view, Some(&human))
}

pub fn run_set(options: SetOptions) -> Result<()> {
    if options.allowed.is_none() && options.max_workload.is_none() {
        return Err(Error::InvalidArgument(
            "nothing to change; pass --allowed and/or --max-workload".to_string(),
        ));
    }
    let max_workload = options
        .max_workload
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let ws = Workspace::open(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;

    let mut changed = false;
    let mut view = None;
    if let Some(allowed) = options.allowed {
        let (updated, did_change) = registry.set_allowed(&id, allowed)?;
        changed |= did_change;
        view = Some(updated);
    }
    if let Some(max_workload) = max_workload {
        let (updated, did_change) = registry.set_max_workload(&id, max_workload)?;
        changed |= did_change;
        view = Some(updated);
    }
    let view = match view {
        Some(view) => view,
        None => registry.get(&id)?,
    };
    if changed {
        tracing::info!(assignment = %id, allowed = view.allowed, max_workload_secs = view.max_workload.as_secs(), "assignment updated");
    }

    let mut human = Report::new(if changed {
        "Assignment updated".to_string()
    } else {
        "No assignment changes".to_string()
    });
    human.field("ID", view.id.to_string());
    human.field("Allowed", view.allowed.to_string());
    human.workload_cap(&view);

    let output = AssignmentChangeOutput {
        assignment: view,
        changed,
    };
    emit_success(options.globals.output(), "assignment set", &output, Some(&human))
}

pub fn run_rm(options: RmOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;
    let view = registry.remove(&id)?;

    let mut human = Report::new("Assignment removed");
    human.field("ID", view.id.to_string());
    human.field("User", view.user.clone());
    if view.logging {
        human.warn("an open log was discarded");
    }

    emit_success(options.globals.output(), "assignment rm", &view, Some(&human))
}
