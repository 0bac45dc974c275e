//! Semantic-SAST driver: CodeQL, two-phase (database create, then analyze).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{run_command, DriverOutcome, ScannerDriver};

#[derive(Debug, Default)]
pub struct CodeqlDriver;

/// Resolves the `codeql` binary from `CODEQL_HOME` (probing the layout of
/// the official bundle) or falls back to PATH resolution by the shell.
fn resolve_binary() -> String {
    if let Ok(home) = std::env::var("CODEQL_HOME") {
        let base = home.trim_end_matches('/');
        let nested = PathBuf::from(base).join("codeql").join("codeql");
        if nested.is_file() {
            return nested.to_string_lossy().into_owned();
        }
        let exe = PathBuf::from(base).join("codeql.exe");
        if exe.is_file() {
            return exe.to_string_lossy().into_owned();
        }
    }
    "codeql".to_string()
}

#[async_trait]
impl ScannerDriver for CodeqlDriver {
    fn name(&self) -> &'static str {
        "codeql"
    }

    async fn run(&self, work_dir: &Path, timeout: Duration) -> DriverOutcome {
        let codeql_bin = resolve_binary();
        let db_path = work_dir.join("codeql_db");
        let out_path = work_dir.join("codeql.sarif");

        if db_path.is_dir() {
            let _ = std::fs::remove_dir_all(&db_path);
        }

        let db_arg = db_path.to_string_lossy().into_owned();
        let source_root_arg = work_dir.to_string_lossy().into_owned();
        // CODEQL_HOME must not reach the child: the binary discovers its own
        // bundle root from its executable path, and a stale value can point
        // it at the wrong extractor set.
        let (ok_create, out_create) = run_command(
            &codeql_bin,
            &[
                "database",
                "create",
                &db_arg,
                "--language=python",
                "--source-root",
                &source_root_arg,
            ],
            work_dir,
            timeout,
            &[],
            &["CODEQL_HOME"],
        )
        .await;
        if !ok_create {
            return DriverOutcome {
                ok: false,
                message: if out_create.is_empty() {
                    "codeql database create failed".to_string()
                } else {
                    out_create
                },
                artifact_path: None,
            };
        }

        let out_arg = format!("--output={}", out_path.to_string_lossy());
        let (ok_analyze, out_analyze) = run_command(
            &codeql_bin,
            &["database", "analyze", &db_arg, "--format=sarif-latest", &out_arg],
            work_dir,
            timeout,
            &[],
            &["CODEQL_HOME"],
        )
        .await;

        if ok_analyze && out_path.is_file() {
            return DriverOutcome {
                ok: true,
                message: if out_analyze.is_empty() { "ok".to_string() } else { out_analyze },
                artifact_path: Some(out_path),
            };
        }

        DriverOutcome {
            ok: false,
            message: if out_analyze.is_empty() { "no output file".to_string() } else { out_analyze },
            artifact_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_command_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = CodeqlDriver.run(dir.path(), Duration::from_secs(5)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "command not found");
    }

    #[test]
    fn resolve_binary_falls_back_to_path_when_unset() {
        std::env::remove_var("CODEQL_HOME");
        assert_eq!(resolve_binary(), "codeql");
    }
}
