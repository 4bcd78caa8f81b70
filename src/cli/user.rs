//! worklog user command implementation
//!
//! Provides user identity helpers (set/show).

use std::path::PathBuf;

use crate::cli::GlobalOptions;
use crate::error::Result;
use crate::output::{emit_success, Report};
use crate::storage::Storage;
use crate::user;

/// Options for `worklog user set`
pub struct SetOptions {
    pub name: String,
    pub globals: GlobalOptions,
}

#[derive(serde::Serialize)]
struct UserSetReport {
    user: String,
    path: PathBuf,
}

#[derive(serde::Serialize)]
struct UserShowReport {
    user: String,
}

pub fn run_set(options: SetOptions) -> Result<()> {
    let root = options.globals.resolve_root()?;
    user::persist_user(&root, &options.name)?;

    // Read back through the resolver so the report shows the trimmed name.
    let name = user::resolve_user(Some(&root), Some(&options.name))?;
    let path = Storage::new(root).user_file();

    let report = UserSetReport {
        user: name.clone(),
        path: path.clone(),
    };

    let mut human = Report::new(format!("worklog user set: {name}"));
    human.field("user", name);
    human.field("path", path.display().to_string());
    human.next_step("worklog assignment ls");

    emit_success(options.globals.output(), "user set", &report, Some(&human))
}

pub fn run_show(globals: GlobalOptions) -> Result<()> {
    let root = globals.resolve_root()?;
    let name = user::resolve_user(Some(&root), globals.user.as_deref())?;

    let report = UserShowReport { user: name.clone() };

    let header = if name == "unknown" {
        "worklog user: not set".to_string()
    } else {
        format!("worklog user: {name}")
    };

    let mut human = Report::new(header);
    human.field("user", name.clone());
    if name == "unknown" {
        human.warn("user not set; using default");
        human.next_step("worklog user set <name>");
    }

    emit_success(globals.output(), "user show", &report, Some(&human))
}
