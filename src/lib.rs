//! worklog - Work Time Logging Library
//!
//! This library provides the core of the worklog CLI: assignments of users to
//! tasks, and the start/stop state machine that records time against them.
//!
//! # Core Concepts
//!
//! - **Assignment**: one user bound to one task, with a logging switch, an
//!   optional workload cap, one current log slot, and an archive of entries
//! - **Workload**: the sum of archived entry times, rederived on every save
//! - **Eligibility**: user match, started task, logging enabled, cap not reached
//! - **Registry**: serializes start/stop per assignment and persists results
//!
//! # Module Organization
//!
//! - `assignment`: Log entries, the assignment ledger, duration helpers
//! - `catalog`: Projects, tasks and task status lookup
//! - `journal`: Personal dated entries tagged with emotions
//! - `registry`: Locked start/stop/check entry points over a store
//! - `storage`: Assignment stores (in-memory and `.worklog/` files)
//! - `lock`: File locking, atomic writes, per-assignment lock table
//! - `config`: Configuration loading from `.worklog.toml`
//! - `user`: User identity resolution
//! - `error`: Error types and result aliases
//! - `output`: Human/JSON output for the CLI
//! - `cli`: Command-line interface using clap

pub mod assignment;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod journal;
pub mod lock;
pub mod output;
pub mod registry;
pub mod storage;
pub mod user;

pub use assignment::{Assignment, CurrentLog, Eligibility, LogEntry};
pub use catalog::{TaskDirectory, TaskStatus};
pub use error::{Error, Result};
pub use registry::{AssignmentRegistry, AssignmentView};
pub use storage::{AssignmentStore, MemoryStore, Storage};
