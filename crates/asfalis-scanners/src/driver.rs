//! Common shape for scanner driver adapters.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Outcome of one driver invocation.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub ok: bool,
    pub message: String,
    pub artifact_path: Option<PathBuf>,
}

/// Adapter invoking one external scanner as a child process.
#[async_trait]
pub trait ScannerDriver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, work_dir: &Path, timeout: Duration) -> DriverOutcome;
}

/// Spawns `program` with `args` in `cwd`, capturing stdout+stderr combined
/// and enforcing `timeout` as a hard kill. Maps spawn-not-found and timeout
/// to the sentinel messages the normalizer and stage recording expect.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
    env_overrides: &[(&str, &str)],
    env_removals: &[&str],
) -> (bool, String) {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env_overrides {
        cmd.env(key, value);
    }
    for key in env_removals {
        cmd.env_remove(key);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (false, "command not found".to_string())
        }
        Err(e) => return (false, e.to_string()),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            debug!(program, success = output.status.success(), "driver subprocess exited");
            (output.status.success(), combined)
        }
        Ok(Err(e)) => (false, e.to_string()),
        Err(_) => (false, "timeout".to_string()),
    }
}

pub(crate) fn file_is_non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
