//! Quality publisher driver: `sonar-scanner`.
//!
//! Deviates from the original source in one respect: when `SONAR_HOST_URL`
//! / `SONAR_TOKEN` are absent this reports `ok = true` ("skipped") rather
//! than `ok = false`, since an unconfigured optional publisher is not a
//! scan failure.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{run_command, DriverOutcome, ScannerDriver};

pub struct SonarDriver {
    project_key: String,
}

impl SonarDriver {
    /// `project_key` should already be the truncated `asfalis-<scan_id>` form.
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
        }
    }
}

#[async_trait]
impl ScannerDriver for SonarDriver {
    fn name(&self) -> &'static str {
        "sonar"
    }

    async fn run(&self, work_dir: &Path, timeout: Duration) -> DriverOutcome {
        let (Ok(host_url), Ok(token)) = (
            std::env::var("SONAR_HOST_URL"),
            std::env::var("SONAR_TOKEN"),
        ) else {
            return DriverOutcome {
                ok: true,
                message: "skipped".to_string(),
                artifact_path: None,
            };
        };

        let props_path = work_dir.join("sonar-project.properties");
        let contents = format!("sonar.projectKey={}\nsonar.sources=.\n", self.project_key);
        if let Err(e) = std::fs::write(&props_path, contents) {
            return DriverOutcome {
                ok: false,
                message: e.to_string(),
                artifact_path: None,
            };
        }

        let base_dir_arg = format!("-Dsonar.projectBaseDir={}", work_dir.display());
        let (ok, output) = run_command(
            "sonar-scanner",
            &[&base_dir_arg],
            work_dir,
            timeout,
            &[("SONAR_HOST_URL", host_url.as_str()), ("SONAR_TOKEN", token.as_str())],
            &[],
        )
        .await;

        DriverOutcome {
            ok,
            message: output,
            artifact_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_when_unconfigured() {
        std::env::remove_var("SONAR_HOST_URL");
        std::env::remove_var("SONAR_TOKEN");
        let dir = tempfile::tempdir().unwrap();
        let outcome = SonarDriver::new("asfalis-test").run(dir.path(), Duration::from_secs(5)).await;
        assert!(outcome.ok);
        assert_eq!(outcome.message, "skipped");
        assert!(outcome.artifact_path.is_none());
    }
}
