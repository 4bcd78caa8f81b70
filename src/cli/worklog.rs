//! worklog start / stop / log / can-log command implementations.
//!
//! The registry answers a refused transition with `false`; these commands turn
//! that answer into [`Error::NotPermitted`] carrying the reason.

use crate::assignment::{format_duration, parse_duration, Eligibility};
use crate::catalog::TaskDirectory;
use crate::cli::{resolve_assignment_id, GlobalOptions, Workspace};
use crate::error::{Error, Result};
use crate::output::{emit_success, Report};
use crate::registry::AssignmentRegistry;
use crate::storage::AssignmentStore;
use uuid::Uuid;

pub struct LogOptions {
    pub assignment: String,
    pub notes: Option<String>,
    pub globals: GlobalOptions,
}

pub struct ManualOptions {
    pub assignment: String,
    pub duration: String,
    pub notes: Option<String>,
    pub globals: GlobalOptions,
}

pub struct CanLogOptions {
    pub assignment: String,
    pub globals: GlobalOptions,
}

#[derive(serde::Serialize)]
struct CanLogOutput {
    assignment_id: Uuid,
    user: String,
    allowed: bool,
    eligibility: Eligibility,
}

pub fn run_start(options: LogOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let user = ws.user(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;

    let (view, started) = registry.start_worklog(&id, &user, options.notes.as_deref())?;
    if !started {
        return Err(refusal(&registry, &id, &user, "a log is already open")?);
    }

    let mut human = Report::new("Worklog started");
    human.field("Assignment", view.id.to_string());
    human.field("User", view.user.clone());
    if let Some(start) = view.current_log.start {
        human.field("Started", start.to_rfc3339());
    }
    human.workload(&view);
    human.next_step(format!("worklog stop {}", view.id));

    emit_success(options.globals.output(), "start", &view, Some(&human))
}

pub fn run_stop(options: LogOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let user = ws.user(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;

    let (view, stopped) = registry.stop_worklog(&id, &user, options.notes.as_deref())?;
    if !stopped {
        return Err(refusal(&registry, &id, &user, "no log is open")?);
    }

    let mut human = Report::new("Worklog stopped");
    human.field("Assignment", view.id.to_string());
    if let Some(entry) = view.archived_log.last() {
        human.field("Logged", format_duration(entry.workload()));
    }
    human.workload(&view);
    if view.remaining_workload() == Some(std::time::Duration::ZERO) {
        human.warn("maximum workload reached; no more time can be logged");
    }

    emit_success(options.globals.output(), "stop", &view, Some(&human))
}

pub fn run_log(options: ManualOptions) -> Result<()> {
    let time = parse_duration(&options.duration)?;
    if time.is_zero() {
        return Err(Error::InvalidArgument(
            "logged time must be greater than zero".to_string(),
        ));
    }

    let ws = Workspace::open(&options.globals)?;
    let user = ws.user(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;

    let (view, logged) = registry.log_manual_time(&id, &user, time, options.notes.as_deref())?;
    if !logged {
        let fallback = if view.logging {
            "stop the open log before recording time by hand"
        } else {
            "logged time would overflow the assignment's workload"
        };
        return Err(refusal(&registry, &id, &user, fallback)?);
    }
    tracing::info!(assignment = %id, user = %user, secs = time.as_secs(), "manual time logged");

    let mut human = Report::new("Time logged");
    human.field("Assignment", view.id.to_string());
    human.field("Logged", format_duration(time));
    human.workload(&view);

    emit_success(options.globals.output(), "log", &view, Some(&human))
}

pub fn run_can_log(options: CanLogOptions) -> Result<()> {
    let ws = Workspace::open(&options.globals)?;
    let user = ws.user(&options.globals)?;
    let registry = ws.registry();
    let id = resolve_assignment_id(registry.store(), &options.assignment)?;

    let eligibility = registry.eligibility(&id, &user)?;
    let output = CanLogOutput {
        assignment_id: id,
        user: user.clone(),
        allowed: eligibility.is_allowed(),
        eligibility,
    };

    let mut human = Report::new(if output.allowed {
        format!("{user} can log time")
    } else {
        format!("{user} cannot log time")
    });
    human.field("Assignment", id.to_string());
    human.field("Reason", eligibility.to_string());

    emit_success(options.globals.output(), "can-log", &output, Some(&human))
}

/// Explain a refused transition. Eligibility failures win over the
/// state-specific fallback.
fn refusal<S, D>(
    registry: &AssignmentRegistry<S, D>,
    id: &Uuid,
    user: &str,
    fallback: &str,
) -> Result<Error>
where
    S: AssignmentStore,
    D: TaskDirectory,
{
    let eligibility = registry.eligibility(id, user)?;
    let reason = if eligibility.is_allowed() {
        fallback.to_string()
    } else {
        eligibility.to_string()
    };
    Ok(Error::NotPermitted(reason))
}
