//! Assignment ledger: the work-time logging state machine.
//!
//! An [`Assignment`] binds one user to one task. It owns a single current-log
//! slot and an append-only archive of completed entries:
//!
//! ```text
//!            start (eligible, idle)
//!   Idle  ─────────────────────────▶  Logging { start, notes }
//!    ▲                                    │
//!    └──────── stop (eligible) ───────────┘
//!              entry archived, workload recomputed
//! ```
//!
//! `current_workload` is derived: it is the sum of the archived entries' `time`
//! and is recomputed by [`Assignment::recompute_workload`] on every store write,
//! never adjusted incrementally.
//!
//! Refusals ("not eligible right now", "no open log") are `false` results,
//! not errors. The task status is passed in by the caller; the ledger never
//! looks tasks up itself.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::TaskStatus;
use crate::error::{Error, Result};

// =============================================================================
// Log entries
// =============================================================================

/// Flat log entry shape shared by the current slot rendering and the archive.
///
/// An archived entry is always `completed` with `time` set. Manual entries
/// carry `time` without `start`/`stop`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
    pub time: Option<Duration>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub completed: bool,
}

impl LogEntry {
    /// The canonical empty value: no start, stop, or time, no notes, not completed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Time was logged by hand rather than measured between start and stop.
    pub fn is_manual(&self) -> bool {
        self.time.is_some() && (self.start.is_none() || self.stop.is_none())
    }

    pub fn workload(&self) -> Duration {
        self.time.unwrap_or_default()
    }
}

/// The single current-log slot of an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CurrentLog {
    #[default]
    Idle,
    Logging {
        start: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        notes: String,
    },
}

impl CurrentLog {
    pub fn is_logging(&self) -> bool {
        matches!(self, CurrentLog::Logging { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CurrentLog::Idle => None,
            CurrentLog::Logging { start, .. } => Some(*start),
        }
    }

    /// Render the slot in the flat entry shape. `Idle` is the canonical empty value.
    pub fn to_entry(&self) -> LogEntry {
        match self {
            CurrentLog::Idle => LogEntry::empty(),
            CurrentLog::Logging { start, notes } => LogEntry {
                start: Some(*start),
                notes: notes.clone(),
                ..LogEntry::empty()
            },
        }
    }
}

// =============================================================================
// Eligibility
// =============================================================================

/// Outcome of the logging permission check. The first failing condition wins,
/// checked in the order: user, task status, allowed switch, workload cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Eligibility {
    Allowed,
    WrongUser,
    TaskNotStarted { status: TaskStatus },
    LoggingDisabled,
    WorkloadExhausted,
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Eligibility::Allowed)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::Allowed => write!(f, "logging allowed"),
            Eligibility::WrongUser => write!(f, "assignment belongs to another user"),
            Eligibility::TaskNotStarted { status } => {
                write!(f, "task is {status}; only started tasks accept time")
            }
            Eligibility::LoggingDisabled => write!(f, "logging is disabled for this assignment"),
            Eligibility::WorkloadExhausted => write!(f, "maximum workload reached"),
        }
    }
}

// =============================================================================
// Assignment
// =============================================================================

/// One user bound to one task, with its logging state and history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user: String,
    /// Logging switch; when false nothing can be logged.
    pub allowed: bool,
    /// Workload cap. Zero means no cap.
    pub max_workload: Duration,
    #[serde(default)]
    current_workload: Duration,
    #[serde(default)]
    current_log: CurrentLog,
    #[serde(default)]
    archived_log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(task_id: Uuid, user: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            user: user.into(),
            allowed: true,
            max_workload: Duration::ZERO,
            current_workload: Duration::ZERO,
            current_log: CurrentLog::Idle,
            archived_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_workload(mut self, max_workload: Duration) -> Self {
        self.max_workload = max_workload;
        self
    }

    pub fn with_allowed(mut self, allowed: bool) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn current_workload(&self) -> Duration {
        self.current_workload
    }

    pub fn current_log(&self) -> &CurrentLog {
        &self.current_log
    }

    pub fn archived_log(&self) -> &[LogEntry] {
        &self.archived_log
    }

    pub fn is_logging(&self) -> bool {
        self.current_log.is_logging()
    }

    pub fn has_workload_cap(&self) -> bool {
        !self.max_workload.is_zero()
    }

    /// Workload left under the cap, or `None` when uncapped.
    pub fn remaining_workload(&self) -> Option<Duration> {
        self.has_workload_cap()
            .then(|| self.max_workload.saturating_sub(self.current_workload))
    }

    // -------------------------------------------------------------------------
    // Permission check
    // -------------------------------------------------------------------------

    pub fn eligibility(&self, user: &str, task_status: TaskStatus) -> Eligibility {
        if self.user != user {
            return Eligibility::WrongUser;
        }
        if !task_status.permits_logging() {
            return Eligibility::TaskNotStarted {
                status: task_status,
            };
        }
        if !self.allowed {
            return Eligibility::LoggingDisabled;
        }
        if self.has_workload_cap() && self.current_workload >= self.max_workload {
            return Eligibility::WorkloadExhausted;
        }
        Eligibility::Allowed
    }

    pub fn can_log_time(&self, user: &str, task_status: TaskStatus) -> bool {
        self.eligibility(user, task_status).is_allowed()
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    pub fn start_log_time(&mut self, user: &str, task_status: TaskStatus, notes: Option<&str>) -> bool {
        self.start_log_time_at(user, task_status, notes, Utc::now())
    }

    /// Open a log at `now`. Refused while a log is already open.
    pub fn start_log_time_at(
        &mut self,
        user: &str,
        task_status: TaskStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.can_log_time(user, task_status) || self.is_logging() {
            return false;
        }

        self.current_log = CurrentLog::Logging {
            start: now,
            notes: clean_notes(notes).unwrap_or_default().to_string(),
        };
        self.updated_at = now;
        true
    }

    pub fn stop_log_time(&mut self, user: &str, task_status: TaskStatus, notes: Option<&str>) -> bool {
        self.stop_log_time_at(user, task_status, notes, Utc::now())
    }

    /// Close the open log at `now` and move it into the archive.
    pub fn stop_log_time_at(
        &mut self,
        user: &str,
        task_status: TaskStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.can_log_time(user, task_status) {
            return false;
        }
        let CurrentLog::Logging {
            start,
            notes: start_notes,
        } = &self.current_log
        else {
            return false;
        };

        // A clock stepping backwards yields zero rather than a negative span.
        let time = (now - *start).to_std().unwrap_or_default();
        let entry = LogEntry {
            start: Some(*start),
            stop: Some(now),
            time: Some(time),
            notes: join_notes(start_notes, clean_notes(notes)),
            completed: true,
        };

        self.archived_log.push(entry);
        self.current_log = CurrentLog::Idle;
        self.recompute_workload();
        self.updated_at = now;
        true
    }

    /// Archive a completed entry of `time` without start/stop timestamps.
    ///
    /// Same gate as start; refused while a log is open, for a zero duration,
    /// or when the total workload would overflow.
    pub fn log_manual_time_at(
        &mut self,
        user: &str,
        task_status: TaskStatus,
        time: Duration,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if time.is_zero() || !self.can_log_time(user, task_status) || self.is_logging() {
            return false;
        }
        if self.current_workload.checked_add(time).is_none() {
            return false;
        }

        self.archived_log.push(LogEntry {
            start: None,
            stop: None,
            time: Some(time),
            notes: clean_notes(notes).unwrap_or_default().to_string(),
            completed: true,
        });
        self.recompute_workload();
        self.updated_at = now;
        true
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    /// Returns whether the value changed.
    pub fn set_allowed(&mut self, allowed: bool, now: DateTime<Utc>) -> bool {
        if self.allowed == allowed {
            return false;
        }
        self.allowed = allowed;
        self.updated_at = now;
        true
    }

    /// Returns whether the value changed.
    pub fn set_max_workload(&mut self, max_workload: Duration, now: DateTime<Utc>) -> bool {
        if self.max_workload == max_workload {
            return false;
        }
        self.max_workload = max_workload;
        self.updated_at = now;
        true
    }

    // -------------------------------------------------------------------------
    // Derived workload
    // -------------------------------------------------------------------------

    /// Persist hook: rederive `current_workload` from the archive.
    pub fn recompute_workload(&mut self) {
        self.current_workload = archive_workload(&self.archived_log);
    }

    pub fn workload_is_consistent(&self) -> bool {
        self.current_workload == archive_workload(&self.archived_log)
    }

    #[cfg(test)]
    pub(crate) fn archived_log_mut(&mut self) -> &mut Vec<LogEntry> {
        &mut self.archived_log
    }
}

/// Saturates at `Duration::MAX`; a hand-edited archive must still load.
fn archive_workload(archive: &[LogEntry]) -> Duration {
    archive
        .iter()
        .fold(Duration::ZERO, |total, entry| total.saturating_add(entry.workload()))
}

fn clean_notes(notes: Option<&str>) -> Option<&str> {
    notes.map(str::trim).filter(|n| !n.is_empty())
}

fn join_notes(existing: &str, added: Option<&str>) -> String {
    match (existing.is_empty(), added) {
        (_, None) => existing.to_string(),
        (true, Some(added)) => added.to_string(),
        (false, Some(added)) => format!("{existing}\n{added}"),
    }
}

// =============================================================================
// Duration parsing
// =============================================================================

/// Largest duration [`parse_duration`] accepts: 100 years of 365 days.
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Parse a duration like "2h", "90m", "1h30m", "45s", "1d", "0".
///
/// A bare number is minutes. Results above [`MAX_DURATION`] are rejected.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        let minutes: u64 = s
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {}", s)))?;
        return within_bound(minutes_to_duration(minutes, s)?, s);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (num_str, tail) = rest.split_at(digits_end);
        if num_str.is_empty() {
            return Err(Error::InvalidArgument(format!("Invalid duration: {}", s)));
        }
        let unit_end = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let num: u64 = num_str
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {}", num_str)))?;
        let seconds_per_unit: u64 = match unit.trim().to_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => 1,
            "m" | "min" | "minute" | "minutes" => 60,
            "h" | "hr" | "hour" | "hours" => 3600,
            "d" | "day" | "days" => 86_400,
            "w" | "week" | "weeks" => 604_800,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "Invalid duration unit '{}'. Expected: s, m, h, d, w",
                    unit
                )));
            }
        };
        let seconds = num
            .checked_mul(seconds_per_unit)
            .ok_or_else(|| Error::InvalidArgument(format!("Duration too large: {}", s)))?;
        total = total
            .checked_add(Duration::from_secs(seconds))
            .ok_or_else(|| Error::InvalidArgument(format!("Duration too large: {}", s)))?;
        rest = next;
    }

    within_bound(total, s)
}

fn within_bound(duration: Duration, raw: &str) -> Result<Duration> {
    if duration > MAX_DURATION {
        return Err(Error::InvalidArgument(format!(
            "Duration too large: {} (max {})",
            raw,
            format_duration(MAX_DURATION)
        )));
    }
    Ok(duration)
}

fn minutes_to_duration(minutes: u64, raw: &str) -> Result<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::InvalidArgument(format!("Duration too large: {}", raw)))
}

/// Compact human form: "1h30m", "45m", "12s", "0s". Sub-second parts are dropped.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}
