//! Postgres-backed [`CatalogStore`].
//!
//! The claim query is the one place correctness genuinely depends on the
//! backend: at-most-once claiming across concurrently running dispatcher
//! processes relies on `SELECT ... FOR UPDATE SKIP LOCKED` inside a single
//! transaction, which Postgres gives us directly and which the rest of this
//! codebase's previous SurrealDB backend has no equivalent for.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{info, instrument};

use asfalis_core::{
    Finding, InstallationId, Repo, RepoId, ScanArtifact, ScanRun, ScanRunId, ScanStage, ScanStatus,
    StageName, Trigger,
};

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::CatalogStore;

/// Thin wrapper around a connection pool; all queries are written with
/// runtime `sqlx::query`/`query_as` rather than the `query!` macro so the
/// crate builds without a live database reachable at compile time.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    /// Connect using the given `DATABASE_URL`-style connection string.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        info!("connected to catalog store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_status(s: &str) -> ScanStatus {
    match s {
        "running" => ScanStatus::Running,
        "completed" => ScanStatus::Completed,
        "failed" => ScanStatus::Failed,
        _ => ScanStatus::Queued,
    }
}

fn row_to_scan_run(row: &sqlx::postgres::PgRow) -> StorageResult<ScanRun> {
    let id: uuid::Uuid = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    Ok(ScanRun {
        id: ScanRunId(id),
        repo_id: RepoId(row.try_get("repo_id")?),
        installation_id: InstallationId(row.try_get("installation_id")?),
        trigger: Trigger::Manual,
        status: parse_status(&status),
        current_stage: row.try_get("current_stage")?,
        branch: row.try_get("branch")?,
        commit_sha: row.try_get("commit_sha")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        error_message: row.try_get("error_message")?,
        result_summary: row.try_get("result_summary")?,
    })
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn bootstrap_schema(&self) -> StorageResult<()> {
        crate::schema::bootstrap(&self.pool).await
    }

    #[instrument(skip(self))]
    async fn sweep_orphans(&self, threshold: Duration) -> StorageResult<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::from_std(threshold)
            .map_err(|e| StorageError::Query(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE scan_runs SET status = 'failed', error_message = 'orphaned', ended_at = now() \
             WHERE status = 'running' AND started_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        let swept = result.rows_affected();
        if swept > 0 {
            info!(swept, "swept orphaned runs");
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
        sqlx::query(
            "INSERT INTO scan_runs (id, repo_id, installation_id, trigger, status, branch, created_at) \
             VALUES ($1, $2, $3, 'manual', 'queued', $4, $5)",
        )
        .bind(run.id.0)
        .bind(run.repo_id.0)
        .bind(run.installation_id.0)
        .bind(&run.branch)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(run.id)
    }

    #[instrument(skip(self))]
    async fn claim_next_queued(&self) -> StorageResult<Option<ScanRun>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let claimed = sqlx::query(
            "UPDATE scan_runs SET status = 'running', started_at = now() \
             WHERE id = ( \
                 SELECT id FROM scan_runs WHERE status = 'queued' \
                 ORDER BY created_at ASC \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) \
             RETURNING id, repo_id, installation_id, current_stage, branch, commit_sha, \
                       status, created_at, started_at, ended_at, error_message, result_summary",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let run = match claimed {
            Some(row) => Some(row_to_scan_run(&row)?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(run)
    }

    async fn get_repo(&self, repo_id: RepoId) -> StorageResult<Repo> {
        let row = sqlx::query(
            "SELECT repo_id, installation_id, owner, name, full_name, default_branch, \
                    is_private, archived, created_at, last_synced_at \
             FROM repos WHERE repo_id = $1",
        )
        .bind(repo_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(Repo {
            repo_id: RepoId(row.try_get("repo_id")?),
            installation_id: InstallationId(row.try_get("installation_id")?),
            owner: row.try_get("owner")?,
            name: row.try_get("name")?,
            full_name: row.try_get("full_name")?,
            default_branch: row.try_get("default_branch")?,
            is_private: row.try_get("is_private")?,
            archived: row.try_get("archived")?,
            created_at: row.try_get("created_at")?,
            last_synced_at: row.try_get("last_synced_at")?,
        })
    }

    async fn get_run(&self, run_id: ScanRunId) -> StorageResult<ScanRun> {
        let row = sqlx::query(
            "SELECT id, repo_id, installation_id, current_stage, branch, commit_sha, \
                    status, created_at, started_at, ended_at, error_message, result_summary \
             FROM scan_runs WHERE id = $1",
        )
        .bind(run_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        row_to_scan_run(&row)
    }

    async fn open_stage(&self, run_id: ScanRunId, stage: StageName) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        sqlx::query("INSERT INTO scan_stages (run_id, stage, started_at) VALUES ($1, $2, now())")
            .bind(run_id.0)
            .bind(stage.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE scan_runs SET current_stage = $2 WHERE id = $1")
            .bind(run_id.0)
            .bind(stage.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn close_stage(
        &self,
        run_id: ScanRunId,
        stage: StageName,
        error_message: Option<String>,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE scan_stages SET ended_at = now(), error_message = $3 \
             WHERE id = ( \
                 SELECT id FROM scan_stages \
                 WHERE run_id = $1 AND stage = $2 AND ended_at IS NULL \
                 ORDER BY started_at DESC LIMIT 1 \
             )",
        )
        .bind(run_id.0)
        .bind(stage.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::StageNotFound {
                run_id: run_id.to_string(),
                stage: stage.as_str().to_string(),
            });
        }
        Ok(())
    }

    async fn list_stages(&self, run_id: ScanRunId) -> StorageResult<Vec<ScanStage>> {
        let rows = sqlx::query(
            "SELECT stage, started_at, ended_at, error_message FROM scan_stages \
             WHERE run_id = $1 ORDER BY started_at ASC",
        )
        .bind(run_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(ScanStage {
                    run_id,
                    stage: row.try_get("stage")?,
                    started_at: row.try_get("started_at")?,
                    ended_at: row.try_get("ended_at")?,
                    error_message: row.try_get("error_message")?,
                })
            })
            .collect()
    }

    async fn commit_results(
        &self,
        run_id: ScanRunId,
        findings: Vec<Finding>,
        artifacts: Vec<ScanArtifact>,
    ) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for f in &findings {
            sqlx::query(
                "INSERT INTO findings (run_id, tool, rule_id, title, severity_raw, cvss, cwe, \
                    confidence, path, start_line, end_line, fingerprint, help_text, \
                    codeql_trace, severity_normalized) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
            )
            .bind(run_id.0)
            .bind(f.tool.as_str())
            .bind(&f.rule_id)
            .bind(&f.title)
            .bind(&f.severity_raw)
            .bind(&f.cvss)
            .bind(&f.cwe)
            .bind(&f.confidence)
            .bind(&f.path)
            .bind(f.start_line)
            .bind(f.end_line)
            .bind(&f.fingerprint)
            .bind(&f.help_text)
            .bind(&f.codeql_trace)
            .bind(format!("{:?}", f.severity_normalized).to_uppercase())
            .execute(&mut *tx)
            .await?;
        }

        for a in &artifacts {
            sqlx::query(
                "INSERT INTO scan_artifacts (run_id, name, content_type, content) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(run_id.0)
            .bind(&a.name)
            .bind(&a.content_type)
            .bind(&a.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn finalize(&self, run_id: ScanRunId, result_summary: String) -> StorageResult<()> {
        sqlx::query(
            "UPDATE scan_runs SET status = 'completed', ended_at = now(), \
             current_stage = 'finalize', result_summary = $2 WHERE id = $1",
        )
        .bind(run_id.0)
        .bind(result_summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: ScanRunId, error_message: String) -> StorageResult<()> {
        sqlx::query(
            "UPDATE scan_runs SET status = 'failed', ended_at = now(), error_message = $2 \
             WHERE id = $1",
        )
        .bind(run_id.0)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_findings(&self, run_id: ScanRunId) -> StorageResult<Vec<Finding>> {
        let rows = sqlx::query(
            "SELECT tool, rule_id, title, severity_raw, cvss, cwe, confidence, path, \
                    start_line, end_line, fingerprint, help_text, codeql_trace, severity_normalized \
             FROM findings WHERE run_id = $1",
        )
        .bind(run_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let tool: String = row.try_get("tool")?;
                let severity: String = row.try_get("severity_normalized")?;
                Ok(Finding {
                    run_id,
                    tool: match tool.as_str() {
                        "semgrep" => asfalis_core::Tool::Semgrep,
                        "codeql" => asfalis_core::Tool::Codeql,
                        _ => asfalis_core::Tool::Osv,
                    },
                    rule_id: row.try_get("rule_id")?,
                    title: row.try_get("title")?,
                    severity_raw: row.try_get("severity_raw")?,
                    cvss: row.try_get("cvss")?,
                    cwe: row.try_get("cwe")?,
                    confidence: row.try_get("confidence")?,
                    path: row.try_get("path")?,
                    start_line: row.try_get("start_line")?,
                    end_line: row.try_get("end_line")?,
                    fingerprint: row.try_get("fingerprint")?,
                    help_text: row.try_get("help_text")?,
                    codeql_trace: row.try_get("codeql_trace")?,
                    severity_normalized: match severity.as_str() {
                        "CRITICAL" => asfalis_core::Severity::Critical,
                        "HIGH" => asfalis_core::Severity::High,
                        "LOW" => asfalis_core::Severity::Low,
                        "INFO" => asfalis_core::Severity::Info,
                        _ => asfalis_core::Severity::Med,
                    },
                })
            })
            .collect()
    }
}
