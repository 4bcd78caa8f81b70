//! User identity management.
//!
//! The requesting user is resolved in order:
//! 1) CLI --user (explicit)
//! 2) WORKLOG_USER environment variable
//! 3) Persisted value in .worklog/user
//! 4) Config default (user.default) or "unknown"
//!
//! The identity is supplied by the caller; this module does not authenticate.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::STATE_DIR;

const USER_FILENAME: &str = "user";

pub const USER_ENV: &str = "WORKLOG_USER";

/// Resolve the current user using CLI, environment, persisted value, and config.
pub fn resolve_user(root: Option<&Path>, cli_user: Option<&str>) -> Result<String> {
    if let Some(user) = non_empty(cli_user) {
        return Ok(user.to_string());
    }

    if let Ok(env_user) = std::env::var(USER_ENV) {
        if let Some(user) = non_empty(Some(env_user.as_str())) {
            return Ok(user.to_string());
        }
    }

    if let Some(root) = root {
        if let Some(user) = load_persisted_user(root)? {
            return Ok(user);
        }
        return Ok(Config::load_from_root(root).user.default);
    }

    Ok("unknown".to_string())
}

/// Persist the user identity in `.worklog/user`.
pub fn persist_user(root: &Path, user: &str) -> Result<()> {
    let user = non_empty(Some(user))
        .ok_or_else(|| Error::InvalidArgument("user name cannot be empty".to_string()))?;

    std::fs::create_dir_all(root.join(STATE_DIR))?;
    std::fs::write(user_path(root), format!("{user}\n"))?;
    Ok(())
}

pub fn load_persisted_user(root: &Path) -> Result<Option<String>> {
    let path = user_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)?;
    Ok(non_empty(Some(raw.as_str())).map(str::to_string))
}

fn user_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(USER_FILENAME)
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cli_value_wins() {
        let temp = TempDir::new().unwrap();
        persist_user(temp.path(), "persisted").unwrap();
        let user = resolve_user(Some(temp.path()), Some("  alice ")).unwrap();
        assert_eq!(user, "alice");
    }

    #[test]
    fn persisted_value_round_trips() {
        let temp = TempDir::new().unwrap();
        assert_eq!(load_persisted_user(temp.path()).unwrap(), None);
        persist_user(temp.path(), "bob").unwrap();
        assert_eq!(load_persisted_user(temp.path()).unwrap().as_deref(), Some("bob"));
    }

    #[test]
    fn empty_name_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            persist_user(temp.path(), "   "),
            Err(Error::InvalidArgument(_))
        ));
    }
}
