//! SCA driver: `osv-scanner`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{run_command, DriverOutcome, ScannerDriver};

/// Phrases in osv-scanner's combined output that mean "nothing to scan",
/// a legitimate empty result rather than a failure.
const EMPTY_RESULT_PHRASES: &[&str] = &["no manifest", "no lockfile", "nothing to scan"];

#[derive(Debug, Default)]
pub struct OsvDriver;

#[async_trait]
impl ScannerDriver for OsvDriver {
    fn name(&self) -> &'static str {
        "osv"
    }

    async fn run(&self, work_dir: &Path, timeout: Duration) -> DriverOutcome {
        let out_path = work_dir.join("osv.sarif");
        let out_arg = out_path.to_string_lossy().into_owned();
        let (success, output) = run_command(
            "osv-scanner",
            &["scan", "--format", "sarif", "--output", &out_arg, "."],
            work_dir,
            timeout,
            &[],
            &[],
        )
        .await;

        if success && out_path.is_file() {
            return DriverOutcome {
                ok: true,
                message: if output.is_empty() { "ok".to_string() } else { output },
                artifact_path: Some(out_path),
            };
        }

        let lower = output.to_lowercase();
        if EMPTY_RESULT_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
            return DriverOutcome {
                ok: true,
                message: output,
                artifact_path: None,
            };
        }

        DriverOutcome {
            ok: false,
            message: if output.is_empty() { "no output file".to_string() } else { output },
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
        let outcome = OsvDriver.run(dir.path(), Duration::from_secs(5)).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "command not found");
        assert!(outcome.artifact_path.is_none());
    }
}
