//! Error types for worklog
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown assignment/task/project, invalid config)
//! - 3: Not permitted (logging refused for the caller right now)
//! - 4: Operation failed (I/O, lock timeout, corrupt record)
//!
//! A refused start/stop is not an error inside the library; the ledger answers
//! `false`. Only the CLI turns that answer into [`Error::NotPermitted`].

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Exit codes for the worklog CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const NOT_PERMITTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for worklog operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Assignment not found: {0}")]
    AssignmentNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Refusals surfaced by the CLI (exit code 3)
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Timed out waiting for assignment {0}")]
    LockTimeout(Uuid),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::AssignmentNotFound(_)
            | Error::TaskNotFound(_)
            | Error::ProjectNotFound(_)
            | Error::AlreadyExists(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_) => exit_codes::USER_ERROR,

            Error::NotPermitted(_) => exit_codes::NOT_PERMITTED,

            // Operation failures
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::LockTimeout(_)
            | Error::Persistence(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// True when the error means the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::AssignmentNotFound(_) | Error::TaskNotFound(_) | Error::ProjectNotFound(_)
        )
    }

    /// True for storage failures (read, write, or decode).
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Json(_) | Error::Persistence(_))
    }

    /// Structured details for the JSON error envelope
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::AssignmentNotFound(id) | Error::LockTimeout(id) => {
                Some(serde_json::json!({ "assignment_id": id }))
            }
            Error::TaskNotFound(task) => Some(serde_json::json!({ "task": task })),
            Error::ProjectNotFound(project) => Some(serde_json::json!({ "project": project })),
            Error::LockFailed(path) => Some(serde_json::json!({ "lock": path })),
            _ => None,
        }
    }
}

/// Result type alias for worklog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
