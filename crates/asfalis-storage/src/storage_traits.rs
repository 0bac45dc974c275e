//! Storage trait definition for the catalog store.
//!
//! `CatalogStore` is backend-agnostic: the dispatcher, pipeline engine, and
//! CLI all program against this trait. [`crate::postgres::PostgresCatalogStore`]
//! is the real backend; [`crate::memory::MemoryCatalogStore`] is an
//! in-memory fake satisfying the same contract for tests that don't want a
//! live database.

use std::time::Duration;

use async_trait::async_trait;

use asfalis_core::{Finding, InstallationId, Repo, RepoId, ScanArtifact, ScanRun, ScanRunId, StageName};

use crate::error::StorageResult;

/// Transactional catalog operations backing the dispatcher loop and pipeline
/// engine.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Create tables if absent and add any columns newer core versions
    /// require. Idempotent; safe to call on every startup.
    async fn bootstrap_schema(&self) -> StorageResult<()>;

    /// Transition any `running` run older than `threshold` to `failed` with
    /// `error_message = "orphaned"`. Returns the number of rows swept.
    async fn sweep_orphans(&self, threshold: Duration) -> StorageResult<u64>;

    /// Insert a new queued run, as the external enqueuer would.
    async fn enqueue(
        &self,
        repo_id: RepoId,
        installation_id: InstallationId,
        branch: Option<String>,
    ) -> StorageResult<ScanRunId>;

    /// Atomically claim the oldest queued run under row-level locking with
    /// skip-locked semantics, transitioning it to `running`. Returns `None`
    /// if the queue is empty.
    async fn claim_next_queued(&self) -> StorageResult<Option<ScanRun>>;

    /// Look up a repo by its external id (needed by `fetch_repo` to resolve
    /// owner/name/default branch).
    async fn get_repo(&self, repo_id: RepoId) -> StorageResult<Repo>;

    /// Fetch a run by id.
    async fn get_run(&self, run_id: ScanRunId) -> StorageResult<ScanRun>;

    /// Open a stage: write a `ScanStage` row with `started_at = now` and set
    /// the parent's `current_stage`.
    async fn open_stage(&self, run_id: ScanRunId, stage: StageName) -> StorageResult<()>;

    /// Close the most recently opened row for `stage`: set `ended_at = now`
    /// and, if present, `error_message`.
    async fn close_stage(
        &self,
        run_id: ScanRunId,
        stage: StageName,
        error_message: Option<String>,
    ) -> StorageResult<()>;

    /// List stage rows for a run, ordered by `started_at`.
    async fn list_stages(&self, run_id: ScanRunId) -> StorageResult<Vec<asfalis_core::ScanStage>>;

    /// Write all findings and artifacts for a run in one transactional
    /// commit.
    async fn commit_results(
        &self,
        run_id: ScanRunId,
        findings: Vec<Finding>,
        artifacts: Vec<ScanArtifact>,
    ) -> StorageResult<()>;

    /// Transition a run to `completed` with a `result_summary`.
    async fn finalize(&self, run_id: ScanRunId, result_summary: String) -> StorageResult<()>;

    /// Transition a run to `failed` with an `error_message`.
    async fn fail_run(&self, run_id: ScanRunId, error_message: String) -> StorageResult<()>;

    /// List findings for a run (used by the read path / CLI inspection).
    async fn list_findings(&self, run_id: ScanRunId) -> StorageResult<Vec<Finding>>;
}
