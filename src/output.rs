//! Command reporting for the worklog CLI.
//!
//! A command builds a [`Report`] and hands it to [`emit_success`] along with
//! its serializable result. With `--json` the result is wrapped in the
//! `worklog.v1` envelope and the report only contributes warnings and next
//! steps; otherwise the report is rendered as text. Failures go through
//! [`emit_error`], which derives the error kind from the exit code.

use std::time::Duration;

use serde::Serialize;

use crate::assignment::{format_duration, LogEntry};
use crate::error::{Error, Result};
use crate::journal::Entry;
use crate::registry::AssignmentView;

pub const SCHEMA_VERSION: &str = "worklog.v1";

/// Global flags that pick the output channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Text side of a command result.
#[derive(Debug, Clone, Default)]
pub struct Report {
    title: String,
    fields: Vec<(String, String)>,
    rows: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn field(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.fields.push((label.into(), value.into()));
    }

    pub fn row(&mut self, line: impl Into<String>) {
        self.rows.push(line.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn next_step(&mut self, command: impl Into<String>) {
        self.next_steps.push(command.into());
    }

    /// `Workload` field, with what is left under the cap when there is one.
    pub fn workload(&mut self, view: &AssignmentView) {
        let logged = format_duration(view.current_workload);
        let value = match view.remaining_workload() {
            Some(left) => format!("{logged} ({} left)", format_duration(left)),
            None => logged,
        };
        self.field("Workload", value);
    }

    pub fn workload_cap(&mut self, view: &AssignmentView) {
        self.field("Max workload", describe_cap(view.max_workload));
    }

    /// One row per archived entry, oldest first.
    pub fn entries(&mut self, entries: &[LogEntry]) {
        for entry in entries {
            self.row(describe_entry(entry));
        }
    }

    /// Listing row: id, owner, workload against cap, state flags.
    pub fn assignment_row(&mut self, view: &AssignmentView) {
        let mut line = format!(
            "{} {} {} / {}",
            view.id,
            view.user,
            format_duration(view.current_workload),
            describe_cap(view.max_workload)
        );
        if view.logging {
            line.push_str(" [logging]");
        }
        if !view.allowed {
            line.push_str(" [disabled]");
        }
        self.row(line);
    }

    pub fn journal_row(&mut self, entry: &Entry) {
        let mut line = format!("{} {}", entry.occasion, single_line(&entry.text));
        if !entry.emotions.is_empty() {
            line.push_str(&format!(" ({})", entry.emotions.join(", ")));
        }
        self.row(line);
    }

    /// Title, then aligned fields, then rows, warnings and next steps.
    pub fn render(&self) -> String {
        let mut out = vec![self.title.clone()];

        let width = self
            .fields
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0);
        for (label, value) in &self.fields {
            if value.is_empty() {
                out.push(format!("  {label}"));
            } else {
                out.push(format!("  {label:<width$}  {value}"));
            }
        }

        if !self.rows.is_empty() {
            out.push(String::new());
            out.extend(self.rows.iter().map(|row| format!("  {row}")));
        }
        out.extend(self.warnings.iter().map(|w| format!("warning: {w}")));
        out.extend(self.next_steps.iter().map(|s| format!("next: {s}")));

        out.join("\n")
    }
}

/// `unlimited` for a zero cap.
pub fn describe_cap(max_workload: Duration) -> String {
    if max_workload.is_zero() {
        "unlimited".to_string()
    } else {
        format_duration(max_workload)
    }
}

/// `1h30m 2024-01-01T09:00:00+00:00 -> ...: notes`, or `(manual)` for
/// time recorded by hand.
pub fn describe_entry(entry: &LogEntry) -> String {
    let mut line = format_duration(entry.workload());
    match (entry.start, entry.stop) {
        (Some(start), Some(stop)) => {
            line.push_str(&format!(" {} -> {}", start.to_rfc3339(), stop.to_rfc3339()));
        }
        _ => line.push_str(" (manual)"),
    }
    if !entry.notes.is_empty() {
        line.push_str(&format!(": {}", single_line(&entry.notes)));
    }
    line
}

fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    #[serde(flatten)]
    outcome: Outcome<'a, T>,
    #[serde(skip_serializing_if = "is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    next_steps: &'a [String],
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome<'a, T: Serialize> {
    Success { data: &'a T },
    Error { error: ErrorBody },
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn is_empty(items: &&[String]) -> bool {
    items.is_empty()
}

fn print_envelope<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    report: Option<&Report>,
) -> Result<()> {
    if options.json {
        let (warnings, next_steps) = match report {
            Some(report) => (report.warnings.as_slice(), report.next_steps.as_slice()),
            None => (&[][..], &[][..]),
        };
        return print_envelope(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            outcome: Outcome::Success { data },
            warnings,
            next_steps,
        });
    }

    if let (false, Some(report)) = (options.quiet, report) {
        println!("{}", report.render());
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    if json {
        return print_envelope(&Envelope::<()> {
            schema_version: SCHEMA_VERSION,
            command,
            outcome: Outcome::Error {
                error: ErrorBody {
                    message: err.to_string(),
                    code: err.exit_code(),
                    kind: error_kind(err),
                    details: err.details(),
                },
            },
            warnings: &[],
            next_steps: &next_steps,
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

/// Command name for the error envelope, taken from raw args because clap may
/// fail before it produces a `Cli`. Group commands include their subcommand.
pub fn command_name<I>(args: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut words = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--root" || arg == "--user" {
            args.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        let is_group = matches!(
            arg.as_str(),
            "user" | "project" | "task" | "assignment" | "journal"
        );
        words.push(arg);
        if !is_group || words.len() == 2 {
            break;
        }
    }

    if words.is_empty() {
        "worklog".to_string()
    } else {
        words.join(" ")
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "not_permitted",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let step = match err {
        Error::AssignmentNotFound(_) => "worklog assignment ls",
        Error::TaskNotFound(_) => "worklog task ls",
        Error::ProjectNotFound(_) => "worklog project ls",
        Error::NotPermitted(_) => "worklog can-log <assignment>",
        Error::InvalidArgument(message) if message.contains("worklog init") => "worklog init",
        Error::InvalidConfig(_) => "fix .worklog.toml then retry",
        Error::LockTimeout(_) => "retry once the other logger finishes",
        _ => return Vec::new(),
    };
    vec![step.to_string()]
}
