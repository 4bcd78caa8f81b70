#![allow(dead_code)]

use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// Scratch worklog root for CLI tests
pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    /// Fresh root with `worklog init` already run
    pub fn init() -> Self {
        let root = Self::new();
        root.cmd().arg("init").assert().success();
        root
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `worklog --root <tmp>` with identity env cleared
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("worklog").expect("binary");
        cmd.env_remove("WORKLOG_USER")
            .env_remove("WORKLOG_ROOT")
            .env_remove("RUST_LOG")
            .arg("--root")
            .arg(self.path());
        cmd
    }

    /// Same as [`cmd`](Self::cmd) acting as `user`
    pub fn as_user(&self, user: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("--user").arg(user);
        cmd
    }

    /// Run a successful `--json` command and return its `data` field
    pub fn json_ok(&self, user: &str, args: &[&str]) -> Value {
        let output = self
            .as_user(user)
            .arg("--json")
            .args(args)
            .output()
            .expect("run worklog");
        assert!(
            output.status.success(),
            "worklog {:?} failed: {}{}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
        assert_eq!(envelope["status"], "success");
        envelope["data"].clone()
    }

    /// Project "Internal" with started task "Support" assigned to `user`.
    /// Returns the assignment id.
    pub fn seed_assignment(&self, user: &str, max_workload: &str) -> String {
        self.json_ok("admin", &["project", "new", "Internal"]);
        self.json_ok("admin", &["task", "new", "internal", "Support"]);
        let data = self.json_ok(
            "admin",
            &["assign", "support", user, "--max-workload", max_workload],
        );
        data["id"].as_str().expect("assignment id").to_string()
    }
}
