//! The fixed-order staged pipeline: fetch, scan (with one parallel pair),
//! normalize, finalize. One [`PipelineEngine`] instance is shared by the
//! dispatcher loop across every run it claims.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use asfalis_core::{
    AsfalisError, Config, Finding, Repo, Result, ScanArtifact, ScanRun, ScanRunId, StageName, Tool,
    ARTIFACT_CODEQL, ARTIFACT_MERGED, ARTIFACT_OSV, ARTIFACT_SEMGREP,
};
use asfalis_fetch::{download_tarball, extract_tarball, FetchError, TokenBroker};
use asfalis_normalize::{merge_sarif_runs, parse_sarif_to_findings};
use asfalis_scanners::{CodeqlDriver, DriverOutcome, OsvDriver, ScannerDriver, SemgrepDriver, SonarDriver};
use asfalis_storage::CatalogStore;

const SCA_TIMEOUT: Duration = Duration::from_secs(120);
const SAST_TIMEOUT: Duration = Duration::from_secs(300);
const CODEQL_TIMEOUT: Duration = Duration::from_secs(600);
const SONAR_TIMEOUT: Duration = Duration::from_secs(300);

type DriverFactory = Arc<dyn Fn(String) -> Arc<dyn ScannerDriver> + Send + Sync>;

/// Drives one scan run through every stage, recording stage lifecycle and
/// writing the terminal status. Stateless across runs: holds only its
/// collaborators, not per-run data.
pub struct PipelineEngine {
    store: Arc<dyn CatalogStore>,
    token_broker: Arc<dyn TokenBroker>,
    http_client: reqwest::Client,
    max_archive_bytes: u64,
    scan_job_timeout: Duration,
    scan_work_dir: Option<String>,
    sca_driver: Arc<dyn ScannerDriver>,
    sast_driver: Arc<dyn ScannerDriver>,
    codeql_driver: Arc<dyn ScannerDriver>,
    sonar_driver_factory: DriverFactory,
}

impl PipelineEngine {
    pub fn new(store: Arc<dyn CatalogStore>, token_broker: Arc<dyn TokenBroker>, config: &Config) -> Self {
        Self {
            store,
            token_broker,
            http_client: reqwest::Client::new(),
            max_archive_bytes: config.max_archive_bytes,
            scan_job_timeout: config.scan_job_timeout,
            scan_work_dir: config.scan_work_dir.clone(),
            sca_driver: Arc::new(OsvDriver),
            sast_driver: Arc::new(SemgrepDriver),
            codeql_driver: Arc::new(CodeqlDriver),
            sonar_driver_factory: Arc::new(|key| Arc::new(SonarDriver::new(key)) as Arc<dyn ScannerDriver>),
        }
    }

    /// Substitutes scanner drivers; used by tests that stand in for the real
    /// external tool binaries with in-process fakes.
    #[allow(clippy::too_many_arguments)]
    pub fn with_drivers(
        store: Arc<dyn CatalogStore>,
        token_broker: Arc<dyn TokenBroker>,
        config: &Config,
        sca_driver: Arc<dyn ScannerDriver>,
        sast_driver: Arc<dyn ScannerDriver>,
        codeql_driver: Arc<dyn ScannerDriver>,
        sonar_driver_factory: DriverFactory,
    ) -> Self {
        Self {
            sca_driver,
            sast_driver,
            codeql_driver,
            sonar_driver_factory,
            ..Self::new(store, token_broker, config)
        }
    }

    /// Runs one claimed scan to a terminal state. Writes `completed` with a
    /// `result_summary` on success, or `failed` with `error_message` on any
    /// abort condition; either way this always leaves the run terminal.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn run(&self, run_id: ScanRunId) -> Result<()> {
        let deadline = Instant::now() + self.scan_job_timeout;
        match self.run_inner(run_id, deadline).await {
            Ok(summary) => {
                info!(run_id = %run_id, summary = %summary, "scan completed");
                self.store
                    .finalize(run_id, summary)
                    .await
                    .map_err(|e| AsfalisError::Catalog(e.to_string()))
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "scan failed");
                if let Err(store_err) = self.store.fail_run(run_id, e.to_string()).await {
                    warn!(run_id = %run_id, error = %store_err, "failed to record terminal failure");
                }
                Err(e)
            }
        }
    }

    async fn run_inner(&self, run_id: ScanRunId, deadline: Instant) -> Result<String> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|e| AsfalisError::Catalog(e.to_string()))?;
        let repo = self
            .store
            .get_repo(run.repo_id)
            .await
            .map_err(|e| AsfalisError::Catalog(e.to_string()))?;

        let scratch_base = self
            .scan_work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().to_string_lossy().into_owned());
        let scratch = tempfile::Builder::new()
            .prefix("asfalis_scan_")
            .tempdir_in(&scratch_base)
            .map_err(|e| AsfalisError::ArchiveExtraction(e.to_string()))?;

        let work_dir = self
            .stage_fetch_repo(run_id, &repo, &run, scratch.path(), deadline)
            .await?;
        self.check_deadline(deadline)?;

        self.execute_stages_from(run_id, &work_dir, deadline).await
    }

    /// Runs every stage after `fetch_repo`. Split out so tests can drive the
    /// scan/normalize/finalize stages against a prepared work directory
    /// without an archive fetch.
    pub async fn execute_stages_from(&self, run_id: ScanRunId, work_dir: &Path, deadline: Instant) -> Result<String> {
        let (osv, semgrep) = self.stage_parallel_sca_sast(run_id, work_dir).await;
        self.check_deadline(deadline)?;

        let codeql = self.stage_semantic_codeql(run_id, work_dir).await;
        self.check_deadline(deadline)?;

        let sonar = self.stage_sonarqube_publish(run_id, work_dir).await;
        self.check_deadline(deadline)?;

        let finding_count = self.stage_normalize(run_id, &osv, &semgrep, &codeql).await?;
        let _ = sonar;

        Ok(Self::result_summary(finding_count, &osv, &semgrep, &codeql))
    }

    fn check_deadline(&self, deadline: Instant) -> Result<()> {
        if Instant::now() >= deadline {
            Err(AsfalisError::JobTimeout)
        } else {
            Ok(())
        }
    }

    async fn open_stage(&self, run_id: ScanRunId, stage: StageName) {
        if let Err(e) = self.store.open_stage(run_id, stage).await {
            warn!(run_id = %run_id, %stage, error = %e, "failed to record stage open");
        }
    }

    async fn close_stage(&self, run_id: ScanRunId, stage: StageName, error_message: Option<String>) {
        if let Err(e) = self.store.close_stage(run_id, stage, error_message).await {
            warn!(run_id = %run_id, %stage, error = %e, "failed to record stage close");
        }
    }

    #[instrument(skip(self, repo, run, scratch_dir), fields(run_id = %run_id))]
    async fn stage_fetch_repo(
        &self,
        run_id: ScanRunId,
        repo: &Repo,
        run: &ScanRun,
        scratch_dir: &Path,
        deadline: Instant,
    ) -> Result<PathBuf> {
        self.open_stage(run_id, StageName::FetchRepo).await;
        let outcome = self.do_fetch_repo(repo, run, scratch_dir, deadline).await;
        self.close_stage(
            run_id,
            StageName::FetchRepo,
            outcome.as_ref().err().map(ToString::to_string),
        )
        .await;
        outcome
    }

    async fn do_fetch_repo(&self, repo: &Repo, run: &ScanRun, scratch_dir: &Path, deadline: Instant) -> Result<PathBuf> {
        let token = self
            .token_broker
            .issue_token(repo.installation_id)
            .await
            .map_err(|e| AsfalisError::TokenIssuance(e.to_string()))?;
        self.check_deadline(deadline)?;

        let git_ref = run
            .branch
            .clone()
            .or_else(|| repo.default_branch.clone())
            .unwrap_or_else(|| "main".to_string());

        let bytes = download_tarball(
            &self.http_client,
            &repo.owner,
            &repo.name,
            &git_ref,
            &token,
            self.max_archive_bytes,
        )
        .await
        .map_err(map_fetch_error)?;
        self.check_deadline(deadline)?;

        extract_tarball(&bytes, scratch_dir).map_err(map_fetch_error)
    }

    #[instrument(skip(self, work_dir), fields(run_id = %run_id))]
    async fn stage_parallel_sca_sast(&self, run_id: ScanRunId, work_dir: &Path) -> (DriverOutcome, DriverOutcome) {
        self.open_stage(run_id, StageName::ScaOsv).await;
        self.open_stage(run_id, StageName::SastSemgrep).await;

        let (osv, semgrep) = tokio::join!(
            self.sca_driver.run(work_dir, SCA_TIMEOUT),
            self.sast_driver.run(work_dir, SAST_TIMEOUT),
        );

        self.close_stage(run_id, StageName::ScaOsv, stage_error(&osv)).await;
        self.close_stage(run_id, StageName::SastSemgrep, stage_error(&semgrep)).await;

        (osv, semgrep)
    }

    #[instrument(skip(self, work_dir), fields(run_id = %run_id))]
    async fn stage_semantic_codeql(&self, run_id: ScanRunId, work_dir: &Path) -> DriverOutcome {
        self.open_stage(run_id, StageName::SemanticCodeql).await;
        let outcome = self.codeql_driver.run(work_dir, CODEQL_TIMEOUT).await;
        self.close_stage(run_id, StageName::SemanticCodeql, stage_error(&outcome)).await;
        outcome
    }

    #[instrument(skip(self, work_dir), fields(run_id = %run_id))]
    async fn stage_sonarqube_publish(&self, run_id: ScanRunId, work_dir: &Path) -> DriverOutcome {
        self.open_stage(run_id, StageName::SonarqubePublish).await;
        let project_key = sonar_project_key(run_id);
        let driver = (self.sonar_driver_factory)(project_key);
        let outcome = driver.run(work_dir, SONAR_TIMEOUT).await;
        self.close_stage(run_id, StageName::SonarqubePublish, stage_error(&outcome)).await;
        outcome
    }

    #[instrument(skip(self, osv, semgrep, codeql), fields(run_id = %run_id))]
    async fn stage_normalize(
        &self,
        run_id: ScanRunId,
        osv: &DriverOutcome,
        semgrep: &DriverOutcome,
        codeql: &DriverOutcome,
    ) -> Result<usize> {
        self.open_stage(run_id, StageName::Normalize).await;
        let result = self.do_normalize(run_id, osv, semgrep, codeql).await;
        match &result {
            Ok(_) => self.close_stage(run_id, StageName::Normalize, None).await,
            Err(e) => self.close_stage(run_id, StageName::Normalize, Some(e.to_string())).await,
        }
        result
    }

    async fn do_normalize(
        &self,
        run_id: ScanRunId,
        osv: &DriverOutcome,
        semgrep: &DriverOutcome,
        codeql: &DriverOutcome,
    ) -> Result<usize> {
        let mut findings: Vec<Finding> = Vec::new();
        let mut artifacts: Vec<ScanArtifact> = Vec::new();
        let mut docs: Vec<String> = Vec::new();

        for (tool, name, outcome) in [
            (Tool::Osv, ARTIFACT_OSV, osv),
            (Tool::Semgrep, ARTIFACT_SEMGREP, semgrep),
            (Tool::Codeql, ARTIFACT_CODEQL, codeql),
        ] {
            let Some(path) = &outcome.artifact_path else { continue };
            let Ok(content) = std::fs::read_to_string(path) else { continue };
            findings.extend(parse_sarif_to_findings(&content, tool, run_id));
            artifacts.push(ScanArtifact::new(run_id, name, content.clone()));
            docs.push(content);
        }

        if let Some(merged) = merge_sarif_runs(&docs) {
            artifacts.push(ScanArtifact::new(run_id, ARTIFACT_MERGED, merged));
        }

        let finding_count = findings.len();
        self.store
            .commit_results(run_id, findings, artifacts)
            .await
            .map_err(|e| AsfalisError::Catalog(e.to_string()))?;
        Ok(finding_count)
    }

    fn result_summary(finding_count: usize, osv: &DriverOutcome, semgrep: &DriverOutcome, codeql: &DriverOutcome) -> String {
        format!(
            "Scans completed. Normalized findings: {finding_count}. OSV: {}, Semgrep: {}, CodeQL: {}.",
            ok_or_skip(osv),
            ok_or_skip(semgrep),
            ok_or_skip(codeql),
        )
    }
}

fn stage_error(outcome: &DriverOutcome) -> Option<String> {
    if outcome.ok {
        None
    } else {
        Some(outcome.message.clone())
    }
}

fn ok_or_skip(outcome: &DriverOutcome) -> &'static str {
    if outcome.ok {
        "ok"
    } else {
        "skip"
    }
}

fn sonar_project_key(run_id: ScanRunId) -> String {
    format!("asfalis-{run_id}").chars().take(64).collect()
}

fn map_fetch_error(e: FetchError) -> AsfalisError {
    match e {
        FetchError::TokenIssuance(m) => AsfalisError::TokenIssuance(m),
        FetchError::ArchiveTooLarge { limit } => AsfalisError::ArchiveTooLarge { limit },
        FetchError::Http(m) => AsfalisError::ArchiveExtraction(m),
        FetchError::Extraction(m) => AsfalisError::ArchiveExtraction(m),
        FetchError::Io(e) => AsfalisError::ArchiveExtraction(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;

    use asfalis_core::{InstallationId, Repo, RepoId};
    use asfalis_storage::MemoryCatalogStore;

    use super::*;

    struct FakeDriver {
        ok: bool,
        message: &'static str,
        sleep: StdDuration,
        write_artifact: Option<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl ScannerDriver for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn run(&self, work_dir: &Path, _timeout: Duration) -> DriverOutcome {
            if !self.sleep.is_zero() {
                tokio::time::sleep(self.sleep).await;
            }
            let artifact_path = self.write_artifact.map(|(file_name, content)| {
                let path = work_dir.join(file_name);
                std::fs::write(&path, content).unwrap();
                path
            });
            DriverOutcome {
                ok: self.ok,
                message: self.message.to_string(),
                artifact_path,
            }
        }
    }

    struct FakeTokenBroker;

    #[async_trait]
    impl TokenBroker for FakeTokenBroker {
        async fn issue_token(&self, _installation_id: InstallationId) -> asfalis_fetch::FetchResult<String> {
            Ok("t1".to_string())
        }
    }

    fn sample_semgrep_sarif() -> &'static str {
        r#"{
            "version": "2.1.0",
            "runs": [{
                "tool": {"driver": {"name": "semgrep", "rules": [
                    {"id": "python.lang.security.secret", "shortDescription": {"text": "Hardcoded secret"}}
                ]}},
                "results": [{
                    "ruleId": "python.lang.security.secret",
                    "level": "error",
                    "message": {"text": "hardcoded secret found"},
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "hello.py"},
                        "region": {"startLine": 1, "endLine": 1}
                    }}]
                }]
            }]
        }"#
    }

    async fn seed_run(store: &MemoryCatalogStore) -> ScanRunId {
        store.seed_repo(Repo {
            repo_id: RepoId(42),
            installation_id: InstallationId(7),
            owner: "acme".into(),
            name: "app".into(),
            full_name: "acme/app".into(),
            default_branch: Some("main".into()),
            is_private: false,
            archived: false,
            created_at: chrono::Utc::now(),
            last_synced_at: None,
        });
        let run_id = store.enqueue(RepoId(42), InstallationId(7), None).await.unwrap();
        store.claim_next_queued().await.unwrap();
        run_id
    }

    fn engine_with(
        store: Arc<dyn CatalogStore>,
        sca: Arc<dyn ScannerDriver>,
        sast: Arc<dyn ScannerDriver>,
        codeql: Arc<dyn ScannerDriver>,
    ) -> PipelineEngine {
        let config = Config {
            database_url: "postgres://localhost/test".into(),
            worker_poll_interval: StdDuration::from_secs(5),
            scan_job_timeout: StdDuration::from_secs(600),
            max_archive_bytes: 52_428_800,
            scan_work_dir: None,
            codeql_home: None,
            sonar_host_url: None,
            sonar_token: None,
            orphan_run_threshold: StdDuration::from_secs(3600),
        };
        PipelineEngine::with_drivers(
            store,
            Arc::new(FakeTokenBroker),
            &config,
            sca,
            sast,
            codeql,
            Arc::new(|key| Arc::new(SonarDriver::new(key)) as Arc<dyn ScannerDriver>),
        )
    }

    #[tokio::test]
    async fn happy_path_yields_one_finding_and_merged_artifact() {
        let store = Arc::new(MemoryCatalogStore::new());
        let run_id = seed_run(&store).await;
        let work_dir = tempfile::tempdir().unwrap();

        let sast = Arc::new(FakeDriver {
            ok: true,
            message: "ok",
            sleep: StdDuration::ZERO,
            write_artifact: Some(("semgrep.sarif", sample_semgrep_sarif())),
        });
        let sca = Arc::new(FakeDriver { ok: true, message: "ok", sleep: StdDuration::ZERO, write_artifact: None });
        let codeql = Arc::new(FakeDriver { ok: false, message: "command not found", sleep: StdDuration::ZERO, write_artifact: None });

        let engine = engine_with(store.clone(), sca, sast, codeql);
        let summary = engine
            .execute_stages_from(run_id, work_dir.path(), Instant::now() + StdDuration::from_secs(600))
            .await
            .unwrap();

        assert!(summary.contains("Normalized findings: 1"));
        assert!(summary.contains("Semgrep: ok"));
        assert!(summary.contains("CodeQL: skip"));

        let findings = store.list_findings(run_id).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].tool, Tool::Semgrep);
    }

    #[tokio::test]
    async fn all_scanners_absent_completes_with_zero_findings() {
        let store = Arc::new(MemoryCatalogStore::new());
        let run_id = seed_run(&store).await;
        let work_dir = tempfile::tempdir().unwrap();

        let absent = || Arc::new(FakeDriver { ok: false, message: "command not found", sleep: StdDuration::ZERO, write_artifact: None });
        let engine = engine_with(store.clone(), absent(), absent(), absent());

        let summary = engine
            .execute_stages_from(run_id, work_dir.path(), Instant::now() + StdDuration::from_secs(600))
            .await
            .unwrap();

        assert!(summary.contains("Normalized findings: 0"));
        assert!(summary.contains("OSV: skip"));
        assert!(summary.contains("Semgrep: skip"));
        assert!(summary.contains("CodeQL: skip"));

        let stages = store.list_stages(run_id).await.unwrap();
        for name in ["sca_osv", "sast_semgrep", "semantic_codeql"] {
            let stage = stages.iter().find(|s| s.stage == name).unwrap();
            assert_eq!(stage.error_message.as_deref(), Some("command not found"));
        }
    }

    #[tokio::test]
    async fn sca_empty_deps_is_recorded_without_error() {
        let store = Arc::new(MemoryCatalogStore::new());
        let run_id = seed_run(&store).await;
        let work_dir = tempfile::tempdir().unwrap();

        let sca = Arc::new(FakeDriver { ok: true, message: "no lockfile found", sleep: StdDuration::ZERO, write_artifact: None });
        let sast = Arc::new(FakeDriver { ok: false, message: "command not found", sleep: StdDuration::ZERO, write_artifact: None });
        let codeql = Arc::new(FakeDriver { ok: false, message: "command not found", sleep: StdDuration::ZERO, write_artifact: None });

        let engine = engine_with(store.clone(), sca, sast, codeql);
        engine
            .execute_stages_from(run_id, work_dir.path(), Instant::now() + StdDuration::from_secs(600))
            .await
            .unwrap();

        let stages = store.list_stages(run_id).await.unwrap();
        let sca_stage = stages.iter().find(|s| s.stage == "sca_osv").unwrap();
        assert!(sca_stage.error_message.is_none());
    }

    #[tokio::test]
    async fn global_timeout_aborts_run_with_job_timeout() {
        let store = Arc::new(MemoryCatalogStore::new());
        let run_id = seed_run(&store).await;
        let work_dir = tempfile::tempdir().unwrap();

        let fast = || Arc::new(FakeDriver { ok: true, message: "ok", sleep: StdDuration::ZERO, write_artifact: None });
        let slow_codeql = Arc::new(FakeDriver {
            ok: true,
            message: "ok",
            sleep: StdDuration::from_millis(50),
            write_artifact: None,
        });
        let engine = engine_with(store, fast(), fast(), slow_codeql);

        let deadline = Instant::now() + StdDuration::from_millis(10);
        let result = engine.execute_stages_from(run_id, work_dir.path(), deadline).await;
        assert!(matches!(result, Err(AsfalisError::JobTimeout)));
    }

    #[tokio::test]
    async fn parallel_fan_out_runs_concurrently_not_sequentially() {
        let store = Arc::new(MemoryCatalogStore::new());
        let run_id = seed_run(&store).await;
        let work_dir = tempfile::tempdir().unwrap();

        let sleepy = || Arc::new(FakeDriver { ok: true, message: "ok", sleep: StdDuration::from_millis(200), write_artifact: None });
        let no_op = Arc::new(FakeDriver { ok: false, message: "command not found", sleep: StdDuration::ZERO, write_artifact: None });

        let engine = engine_with(store, sleepy(), sleepy(), no_op);
        let started = Instant::now();
        engine
            .execute_stages_from(run_id, work_dir.path(), Instant::now() + StdDuration::from_secs(600))
            .await
            .unwrap();
        assert!(started.elapsed() < StdDuration::from_millis(380), "fan-out pair should join concurrently, not serially");
    }
}
