//! In-memory fake for [`CatalogStore`] (testing only).
//!
//! Mirrors the real backend's transition rules (claim ordering, stage
//! open/close, terminal-state writes) without any external dependencies, so
//! the dispatcher, pipeline engine, and their tests can run against a fake
//! rather than a mock of individual method calls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use asfalis_core::{
    Finding, InstallationId, Repo, RepoId, ScanArtifact, ScanRun, ScanRunId, ScanStage, ScanStatus,
    StageName,
};

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::CatalogStore;

#[derive(Debug, Default)]
struct Inner {
    repos: HashMap<RepoId, Repo>,
    runs: HashMap<ScanRunId, ScanRun>,
    stages: HashMap<ScanRunId, Vec<ScanStage>>,
    findings: HashMap<ScanRunId, Vec<Finding>>,
    artifacts: HashMap<ScanRunId, Vec<ScanArtifact>>,
}

/// In-memory catalog store backed by a mutex-guarded map. Not safe for
/// testing concurrent-claim races across processes (it lives in one
/// process's memory); the skip-locked property is instead exercised against
/// the Postgres backend directly.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    inner: Mutex<Inner>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a repo for tests that drive `fetch_repo` against a known owner/name.
    pub fn seed_repo(&self, repo: Repo) {
        self.inner.lock().unwrap().repos.insert(repo.repo_id, repo);
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn bootstrap_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn sweep_orphans(&self, threshold: Duration) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut swept = 0u64;
        for run in inner.runs.values_mut() {
            if run.status == ScanStatus::Running {
                if let Some(started_at) = run.started_at {
                    let age = now.signed_duration_since(started_at);
                    if age.to_std().unwrap_or_default() > threshold {
                        run.status = ScanStatus::Failed;
                        run.error_message = Some("orphaned".to_string());
                        run.ended_at = Some(now);
                        swept += 1;
                    }
                }
            }
        }
        Ok(swept)
    }

    async fn enqueue(
        &self,
        repo_id: RepoId,
        installation_id: InstallationId,
        branch: Option<String>,
    ) -> StorageResult<ScanRunId> {
        let run = ScanRun::queued(repo_id, installation_id, branch);
        let id = run.id;
        self.inner.lock().unwrap().runs.insert(id, run);
        Ok(id)
    }

    async fn claim_next_queued(&self) -> StorageResult<Option<ScanRun>> {
        let mut inner = self.inner.lock().unwrap();
        let next_id = inner
            .runs
            .values()
            .filter(|r| r.status == ScanStatus::Queued)
            .min_by_key(|r| r.created_at)
            .map(|r| r.id);
        let Some(id) = next_id else {
            return Ok(None);
        };
        let run = inner.runs.get_mut(&id).expect("id came from this map");
        run.status = ScanStatus::Running;
        run.started_at = Some(Utc::now());
        Ok(Some(run.clone()))
    }

    async fn get_repo(&self, repo_id: RepoId) -> StorageResult<Repo> {
        self.inner
            .lock()
            .unwrap()
            .repos
            .get(&repo_id)
            .cloned()
            .ok_or_else(|| StorageError::Query(format!("repo {repo_id} not found")))
    }

    async fn get_run(&self, run_id: ScanRunId) -> StorageResult<ScanRun> {
        self.inner
            .lock()
            .unwrap()
            .runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn open_stage(&self, run_id: ScanRunId, stage: StageName) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .stages
            .entry(run_id)
            .or_default()
            .push(ScanStage::open(run_id, stage));
        if let Some(run) = inner.runs.get_mut(&run_id) {
            run.current_stage = Some(stage.as_str().to_string());
        }
        Ok(())
    }

    async fn close_stage(
        &self,
        run_id: ScanRunId,
        stage: StageName,
        error_message: Option<String>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let stages = inner
            .stages
            .get_mut(&run_id)
            .ok_or_else(|| StorageError::StageNotFound {
                run_id: run_id.to_string(),
                stage: stage.as_str().to_string(),
            })?;
        let row = stages
            .iter_mut()
            .rev()
            .find(|s| s.stage == stage.as_str() && s.ended_at.is_none())
            .ok_or_else(|| StorageError::StageNotFound {
                run_id: run_id.to_string(),
                stage: stage.as_str().to_string(),
            })?;
        row.ended_at = Some(Utc::now());
        row.error_message = error_message;
        Ok(())
    }

    async fn list_stages(&self, run_id: ScanRunId) -> StorageResult<Vec<ScanStage>> {
        let mut stages = self
            .inner
            .lock()
            .unwrap()
            .stages
            .get(&run_id)
            .cloned()
            .unwrap_or_default();
        stages.sort_by_key(|s| s.started_at);
        Ok(stages)
    }

    async fn commit_results(
        &self,
        run_id: ScanRunId,
        findings: Vec<Finding>,
        artifacts: Vec<ScanArtifact>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.findings.entry(run_id).or_default().extend(findings);
        inner
            .artifacts
            .entry(run_id)
            .or_default()
            .extend(artifacts);
        Ok(())
    }

    async fn finalize(&self, run_id: ScanRunId, result_summary: String) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        run.status = ScanStatus::Completed;
        run.ended_at = Some(Utc::now());
        run.current_stage = Some(StageName::Finalize.as_str().to_string());
        run.result_summary = Some(result_summary);
        Ok(())
    }

    async fn fail_run(&self, run_id: ScanRunId, error_message: String) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        run.status = ScanStatus::Failed;
        run.ended_at = Some(Utc::now());
        run.error_message = Some(error_message);
        Ok(())
    }

    async fn list_findings(&self, run_id: ScanRunId) -> StorageResult<Vec<Finding>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .findings
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }
}
