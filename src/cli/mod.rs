//! Command-line interface for worklog
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command family is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::OutputOptions;
use crate::registry::AssignmentRegistry;
use crate::storage::{AssignmentStore, Storage};

mod assignment;
mod init;
mod journal;
mod project;
mod task;
mod user;
mod worklog;

/// worklog - time logging against assigned tasks
///
/// Start and stop work logs on assignments, with per-assignment workload
/// caps and task status gating.
#[derive(Parser, Debug)]
#[command(name = "worklog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding .worklog.toml and .worklog/ (defaults to current directory)
    #[arg(long, global = true, env = "WORKLOG_ROOT")]
    pub root: Option<PathBuf>,

    /// User identity for logging operations
    #[arg(long, global = true, env = "WORKLOG_USER")]
    pub user: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize worklog state in a directory
    Init,

    /// Set or show user identity
    #[command(subcommand)]
    User(UserCommands),

    /// Project catalog
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Task catalog
    #[command(subcommand)]
    Task(TaskCommands),

    /// Assign a user to a task
    Assign {
        /// Task id or slug
        task: String,

        /// User to assign
        user: String,

        /// Workload cap (e.g., "40h", "90m"; "0" = no cap)
        #[arg(long)]
        max_workload: Option<String>,

        /// Create the assignment with logging disabled
        #[arg(long)]
        disallow: bool,
    },

    /// Assignment administration
    #[command(subcommand)]
    Assignment(AssignmentCommands),

    /// Start logging time on an assignment
    Start {
        /// Assignment id (or unique id prefix)
        assignment: String,

        /// Notes for this log
        #[arg(long)]
        notes: Option<String>,
    },

    /// Stop the open log and archive it
    Stop {
        /// Assignment id (or unique id prefix)
        assignment: String,

        /// Notes appended to the log
        #[arg(long)]
        notes: Option<String>,
    },

    /// Record time worked without a running log
    Log {
        /// Assignment id (or unique id prefix)
        assignment: String,

        /// Time worked (e.g., "1h30m", "45m")
        duration: String,

        /// Notes for the entry
        #[arg(long)]
        notes: Option<String>,
    },

    /// Check whether the current user may log time
    CanLog {
        /// Assignment id (or unique id prefix)
        assignment: String,
    },

    /// Personal journal
    #[command(subcommand)]
    Journal(JournalCommands),
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Persist the user identity for this root
    Set {
        /// User name
        name: String,
    },

    /// Show the resolved user identity
    Show,
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a project
    New {
        /// Project title
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Owning user
        #[arg(long)]
        owner: Option<String>,
    },

    /// List projects
    Ls,
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task in a project
    New {
        /// Project id or slug
        project: String,

        /// Task title
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Initial status: planned, started, hold, finished
        #[arg(long)]
        status: Option<String>,
    },

    /// List tasks
    Ls {
        /// Only tasks of this project (id or slug)
        #[arg(long)]
        project: Option<String>,
    },

    /// Change a task's status
    Status {
        /// Task id or slug
        task: String,

        /// New status: planned, started, hold, finished
        status: String,
    },

    /// Remove a task and its assignments
    Rm {
        /// Task id or slug
        task: String,
    },
}

/// Assignment subcommands
#[derive(Subcommand, Debug)]
pub enum AssignmentCommands {
    /// List your assignments
    Ls {
        /// List every user's assignments
        #[arg(long)]
        all: bool,
    },

    /// Show one assignment and its log
    Show {
        /// Assignment id (or unique id prefix)
        assignment: String,
    },

    /// Change logging switch or workload cap
    Set {
        /// Assignment id (or unique id prefix)
        assignment: String,

        /// Enable or disable logging
        #[arg(long)]
        allowed: Option<bool>,

        /// Workload cap (e.g., "40h"; "0" = no cap)
        #[arg(long)]
        max_workload: Option<String>,
    },

    /// Remove an assignment
    Rm {
        /// Assignment id (or unique id prefix)
        assignment: String,
    },
}

/// Journal subcommands
#[derive(Subcommand, Debug)]
pub enum JournalCommands {
    /// Write a journal entry
    Add {
        /// Entry text (up to 5000 characters)
        text: String,

        /// Date the entry is about, YYYY-MM-DD (default: today)
        #[arg(long)]
        occasion: Option<String>,

        /// Emotion tag (repeatable)
        #[arg(long = "emotion")]
        emotions: Vec<String>,
    },

    /// List your entries, latest occasion first
    Ls {
        /// Show at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List known emotions
    Emotions,
}

/// Flags shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub root: Option<PathBuf>,
    pub user: Option<String>,
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

impl GlobalOptions {
    pub fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json,
            quiet: self.quiet,
        }
    }

    pub fn resolve_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// Opened worklog root: config, storage, and the registry over it
pub(crate) struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub storage: Storage,
}

impl Workspace {
    pub fn open(globals: &GlobalOptions) -> Result<Self> {
        let root = globals.resolve_root()?;
        let config = Config::load_from_root(&root);
        let storage = Storage::new(root.clone()).with_lock_timeout_ms(config.locks.timeout_ms);
        Ok(Self {
            root,
            config,
            storage,
        })
    }

    pub fn registry(&self) -> AssignmentRegistry<Storage, Storage> {
        AssignmentRegistry::new(self.storage.clone(), self.storage.clone())
            .with_lock_timeout(self.config.locks.timeout())
    }

    pub fn user(&self, globals: &GlobalOptions) -> Result<String> {
        crate::user::resolve_user(Some(&self.root), globals.user.as_deref())
    }
}

/// Resolve a full assignment id or a unique prefix of one.
pub(crate) fn resolve_assignment_id<S: AssignmentStore>(store: &S, selector: &str) -> Result<Uuid> {
    let selector = selector.trim();
    if let Ok(id) = Uuid::parse_str(selector) {
        return Ok(id);
    }
    if selector.is_empty() {
        return Err(Error::InvalidArgument("assignment id cannot be empty".to_string()));
    }

    let prefix = selector.to_lowercase();
    let matches: Vec<Uuid> = store
        .list()?
        .into_iter()
        .map(|a| a.id)
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(Error::InvalidArgument(format!(
            "no assignment matches '{selector}'"
        ))),
        _ => Err(Error::InvalidArgument(format!(
            "'{selector}' matches {} assignments; use more characters",
            matches.len()
        ))),
    }
}

impl Cli {
    fn globals(&self) -> GlobalOptions {
        GlobalOptions {
            root: self.root.clone(),
            user: self.user.clone(),
            json: self.json,
            quiet: self.quiet,
            verbose: self.verbose,
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let globals = self.globals();
        match self.command {
            Commands::Init => init::run(globals),
            Commands::User(cmd) => match cmd {
                UserCommands::Set { name } => user::run_set(user::SetOptions { name, globals }),
                UserCommands::Show => user::run_show(globals),
            },
            Commands::Project(cmd) => match cmd {
                ProjectCommands::New {
                    title,
                    description,
                    owner,
                } => project::run_new(project::NewOptions {
                    title,
                    description,
                    owner,
                    globals,
                }),
                ProjectCommands::Ls => project::run_list(globals),
            },
            Commands::Task(cmd) => match cmd {
                TaskCommands::New {
                    project,
                    title,
                    description,
                    status,
                } => task::run_new(task::NewOptions {
                    project,
                    title,
                    description,
                    status,
                    globals,
                }),
                TaskCommands::Ls { project } => task::run_list(task::ListOptions { project, globals }),
                TaskCommands::Status { task, status } => {
                    task::run_status(task::StatusOptions {
                        task,
                        status,
                        globals,
                    })
                }
                TaskCommands::Rm { task } => task::run_rm(task::RmOptions { task, globals }),
            },
            Commands::Assign {
                task,
                user,
                max_workload,
                disallow,
            } => assignment::run_assign(assignment::AssignOptions {
                task,
                user,
                max_workload,
                disallow,
                globals,
            }),
            Commands::Assignment(cmd) => match cmd {
                AssignmentCommands::Ls { all } => {
                    assignment::run_list(assignment::ListOptions { all, globals })
                }
                AssignmentCommands::Show { assignment } => {
                    assignment::run_show(assignment::ShowOptions {
                        assignment,
                        globals,
                    })
                }
                AssignmentCommands::Set {
                    assignment,
                    allowed,
                    max_workload,
                } => assignment::run_set(assignment::SetOptions {
                    assignment,
                    allowed,
                    max_workload,
                    globals,
                }),
                AssignmentCommands::Rm { assignment } => {
                    assignment::run_rm(assignment::RmOptions {
                        assignment,
                        globals,
                    })
                }
            },
            Commands::Start { assignment, notes } => worklog::run_start(worklog::LogOptions {
                assignment,
                notes,
                globals,
            }),
            Commands::Stop { assignment, notes } => worklog::run_stop(worklog::LogOptions {
                assignment,
                notes,
                globals,
            }),
            Commands::Log {
                assignment,
                duration,
                notes,
            } => worklog::run_log(worklog::ManualOptions {
                assignment,
                duration,
                notes,
                globals,
            }),
            Commands::CanLog { assignment } => worklog::run_can_log(worklog::CanLogOptions {
                assignment,
                globals,
            }),
            Commands::Journal(cmd) => match cmd {
                JournalCommands::Add {
                    text,
                    occasion,
                    emotions,
                } => journal::run_add(journal::AddOptions {
                    text,
                    occasion,
                    emotions,
                    globals,
                }),
                JournalCommands::Ls { limit } => {
                    journal::run_list(journal::ListOptions { limit, globals })
                }
                JournalCommands::Emotions => journal::run_emotions(globals),
            },
        }
    }
}
