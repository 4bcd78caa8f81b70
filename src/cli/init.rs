//! worklog init command implementation
//!
//! Creates the default config and the `.worklog/` state directory.

use std::path::{Path, PathBuf};

use crate::cli::GlobalOptions;
use crate::config::{config_path, Config, CONFIG_FILENAME};
use crate::error::{Error, Result};
use crate::output::{emit_success, Report};
use crate::storage::{Storage, STATE_DIR};

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    state_dir: bool,
}

pub fn run(globals: GlobalOptions) -> Result<()> {
    let root = globals.resolve_root()?;
    if root.exists() && !root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "root is not a directory: {}",
            root.display()
        )));
    }
    std::fs::create_dir_all(&root)?;

    let storage = Storage::new(root.clone());
    let created_state_dir = !storage.is_initialized();
    storage.init()?;
    let created_config = ensure_config(&root)?;

    let report = InitReport {
        root: root.clone(),
        created: InitCreated {
            config: created_config,
            state_dir: created_state_dir,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(CONFIG_FILENAME.to_string());
    }
    if created_state_dir {
        created_items.push(format!("{STATE_DIR}/"));
    }

    let header = if created_items.is_empty() {
        "worklog init: nothing to do".to_string()
    } else {
        "worklog init: initialized".to_string()
    };

    let mut human = Report::new(header);
    human.field("root", root.display().to_string());
    human.field(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.next_step("worklog user set <name>");
    human.next_step("worklog project new <title>");

    emit_success(globals.output(), "init", &report, Some(&human))
}

fn ensure_config(root: &Path) -> Result<bool> {
    let path = config_path(root);
    if path.exists() {
        if !path.is_file() {
            return Err(Error::Persistence(format!(
                "{CONFIG_FILENAME} exists but is not a file: {}",
                path.display()
            )));
        }
        return Ok(false);
    }

    Config::default().save(&path)?;
    Ok(true)
}
