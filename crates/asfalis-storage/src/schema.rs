//! Idempotent schema bootstrap for the catalog store.
//!
//! Table names are unqualified; schema resolution is left to the
//! connection's configured `search_path` rather than a hardcoded namespace
//! (see the open question this resolves in the design notes). Every
//! statement is safe to re-run against an already-migrated database.

use sqlx::PgPool;

use crate::error::StorageResult;

const CREATE_INSTALLATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS installations (
    installation_id BIGINT PRIMARY KEY,
    account_login   TEXT NOT NULL,
    account_type    TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    revoked_at      TIMESTAMPTZ,
    last_seen_at    TIMESTAMPTZ
)"#;

const CREATE_REPOS: &str = r#"
CREATE TABLE IF NOT EXISTS repos (
    repo_id         BIGINT PRIMARY KEY,
    installation_id BIGINT NOT NULL,
    owner           TEXT NOT NULL,
    name            TEXT NOT NULL,
    full_name       TEXT NOT NULL,
    default_branch  TEXT,
    is_private      BOOLEAN NOT NULL DEFAULT false,
    archived        BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_synced_at  TIMESTAMPTZ
)"#;

const CREATE_SCAN_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS scan_runs (
    id              UUID PRIMARY KEY,
    repo_id         BIGINT NOT NULL,
    installation_id BIGINT NOT NULL,
    trigger         TEXT NOT NULL DEFAULT 'manual',
    status          TEXT NOT NULL,
    current_stage   TEXT,
    branch          TEXT,
    commit_sha      TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    started_at      TIMESTAMPTZ,
    ended_at        TIMESTAMPTZ,
    error_message   TEXT,
    result_summary  TEXT
)"#;

// `current_stage` was added after the original table; the ADD COLUMN is
// guarded so it is a no-op against a database that already has it.
const MIGRATE_SCAN_RUNS_CURRENT_STAGE: &str =
    "ALTER TABLE scan_runs ADD COLUMN IF NOT EXISTS current_stage TEXT";

const CREATE_SCAN_RUNS_QUEUE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_scan_runs_queue ON scan_runs (created_at) WHERE status = 'queued'";

const CREATE_SCAN_STAGES: &str = r#"
CREATE TABLE IF NOT EXISTS scan_stages (
    id            BIGSERIAL PRIMARY KEY,
    run_id        UUID NOT NULL,
    stage         TEXT NOT NULL,
    started_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    ended_at      TIMESTAMPTZ,
    error_message TEXT
)"#;

const CREATE_FINDINGS: &str = r#"
CREATE TABLE IF NOT EXISTS findings (
    id                  BIGSERIAL PRIMARY KEY,
    run_id              UUID NOT NULL,
    tool                TEXT NOT NULL,
    rule_id             TEXT,
    title               TEXT,
    severity_raw        TEXT,
    cvss                TEXT,
    cwe                 TEXT,
    confidence          TEXT,
    path                TEXT,
    start_line          BIGINT,
    end_line            BIGINT,
    fingerprint         TEXT NOT NULL,
    help_text           TEXT,
    codeql_trace        TEXT,
    severity_normalized TEXT NOT NULL
)"#;

const CREATE_SCAN_ARTIFACTS: &str = r#"
CREATE TABLE IF NOT EXISTS scan_artifacts (
    id           BIGSERIAL PRIMARY KEY,
    run_id       UUID NOT NULL,
    name         TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content      TEXT NOT NULL
)"#;

/// Create every table if absent and apply any outstanding column
/// migrations. Run unconditionally on every dispatcher/CLI startup.
pub async fn bootstrap(pool: &PgPool) -> StorageResult<()> {
    for stmt in [
        CREATE_INSTALLATIONS,
        CREATE_REPOS,
        CREATE_SCAN_RUNS,
        MIGRATE_SCAN_RUNS_CURRENT_STAGE,
        CREATE_SCAN_RUNS_QUEUE_INDEX,
        CREATE_SCAN_STAGES,
        CREATE_FINDINGS,
        CREATE_SCAN_ARTIFACTS,
    ] {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| crate::error::StorageError::SchemaSetup(e.to_string()))?;
    }
    Ok(())
}
