//! Scan run and stage lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{InstallationId, RepoId, ScanRunId};

/// What triggered a scan run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
}

/// Terminal and non-terminal states of a [`ScanRun`].
///
/// Monotone progression: `Queued -> Running -> {Completed | Failed}`. Once
/// a run reaches a terminal state only `result_summary` may still change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// The fixed pipeline stage names, in execution order (`sca_osv` and
/// `sast_semgrep` run as the one parallel pair).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FetchRepo,
    ScaOsv,
    SastSemgrep,
    SemanticCodeql,
    SonarqubePublish,
    Normalize,
    Finalize,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::FetchRepo => "fetch_repo",
            StageName::ScaOsv => "sca_osv",
            StageName::SastSemgrep => "sast_semgrep",
            StageName::SemanticCodeql => "semantic_codeql",
            StageName::SonarqubePublish => "sonarqube_publish",
            StageName::Normalize => "normalize",
            StageName::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of the pipeline against one repository snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRun {
    pub id: ScanRunId,
    pub repo_id: RepoId,
    pub installation_id: InstallationId,
    pub trigger: Trigger,
    pub status: ScanStatus,
    pub current_stage: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result_summary: Option<String>,
}

impl ScanRun {
    /// Construct a freshly queued run, as the external enqueuer would insert it.
    pub fn queued(repo_id: RepoId, installation_id: InstallationId, branch: Option<String>) -> Self {
        Self {
            id: ScanRunId::new(),
            repo_id,
            installation_id,
            trigger: Trigger::Manual,
            status: ScanStatus::Queued,
            current_stage: None,
            branch,
            commit_sha: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error_message: None,
            result_summary: None,
        }
    }
}

/// One append-only stage record belonging to a [`ScanRun`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanStage {
    pub run_id: ScanRunId,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ScanStage {
    pub fn open(run_id: ScanRunId, stage: StageName) -> Self {
        Self {
            run_id,
            stage: stage.as_str().to_string(),
            started_at: Utc::now(),
            ended_at: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_run_has_no_started_or_ended_at() {
        let run = ScanRun::queued(42, InstallationId(7), Some("main".into()));
        assert_eq!(run.status, ScanStatus::Queued);
        assert!(run.started_at.is_none());
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn terminal_states_are_recognised() {
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
        assert!(!ScanStatus::Queued.is_terminal());
    }

    #[test]
    fn stage_name_round_trips_through_str() {
        for stage in [
            StageName::FetchRepo,
            StageName::ScaOsv,
            StageName::SastSemgrep,
            StageName::SemanticCodeql,
            StageName::SonarqubePublish,
            StageName::Normalize,
            StageName::Finalize,
        ] {
            assert!(!stage.as_str().is_empty());
        }
        assert_eq!(StageName::ScaOsv.as_str(), "sca_osv");
    }

    #[test]
    fn scan_run_serde_roundtrip() {
        let run = ScanRun::queued(1, InstallationId(2), None);
        let json = serde_json::to_string(&run).expect("serialize");
        let back: ScanRun = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(run, back);
    }
}
