//! Environment-driven configuration for the dispatcher and CLI binaries.

use std::time::Duration;

/// All environment variables the core recognizes, collected once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for the catalog store. No default: the process
    /// cannot do anything useful without it.
    pub database_url: String,
    /// Dispatcher sleep between empty polls.
    pub worker_poll_interval: Duration,
    /// Global per-run wall-clock budget.
    pub scan_job_timeout: Duration,
    /// Archive size ceiling, in bytes.
    pub max_archive_bytes: u64,
    /// Base directory for scratch directories; `None` uses the OS temp dir.
    pub scan_work_dir: Option<String>,
    /// Location of the semantic-analyzer bundle, if any.
    pub codeql_home: Option<String>,
    pub sonar_host_url: Option<String>,
    pub sonar_token: Option<String>,
    /// Age past which a `running` run found at startup is orphaned.
    pub orphan_run_threshold: Duration,
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_secs),
    )
}

impl Config {
    /// Build configuration from the process environment, applying the
    /// defaults named in the environment-variable contract.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is not set; cannot create DB session"))?;

        Ok(Self {
            database_url,
            worker_poll_interval: env_duration_secs("WORKER_POLL_INTERVAL", 5),
            scan_job_timeout: env_duration_secs("SCAN_JOB_TIMEOUT", 600),
            max_archive_bytes: std::env::var("MAX_ARCHIVE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(52_428_800),
            scan_work_dir: std::env::var("SCAN_WORK_DIR").ok(),
            codeql_home: std::env::var("CODEQL_HOME").ok(),
            sonar_host_url: std::env::var("SONAR_HOST_URL").ok(),
            sonar_token: std::env::var("SONAR_TOKEN").ok(),
            orphan_run_threshold: env_duration_secs("ORPHAN_RUN_THRESHOLD", 3600),
        })
    }

    /// Whether the quality publisher has everything it needs to run.
    pub fn sonar_configured(&self) -> bool {
        self.sonar_host_url.is_some() && self.sonar_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that touch process env must not interleave with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATABASE_URL");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/asfalis");
        std::env::remove_var("WORKER_POLL_INTERVAL");
        std::env::remove_var("MAX_ARCHIVE_BYTES");
        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.worker_poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.max_archive_bytes, 52_428_800);
        assert!(!cfg.sonar_configured());
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    fn sonar_configured_requires_both_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/asfalis");
        std::env::set_var("SONAR_HOST_URL", "https://sonar.example.com");
        std::env::remove_var("SONAR_TOKEN");
        let cfg = Config::from_env().expect("config");
        assert!(!cfg.sonar_configured());
        std::env::set_var("SONAR_TOKEN", "tok");
        let cfg = Config::from_env().expect("config");
        assert!(cfg.sonar_configured());
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("SONAR_HOST_URL");
        std::env::remove_var("SONAR_TOKEN");
    }
}
