//! Core domain types and ambient stack for the scan orchestration service.
//!
//! Re-exports the canonical entities (`Installation`, `Repo`, `ScanRun`,
//! `ScanStage`, `Finding`, `ScanArtifact`) shared by the catalog store,
//! pipeline engine, scanner drivers, and normalizer crates, plus the
//! environment-driven config and tracing bootstrap used by both binaries.

pub mod config;
pub mod domain;
pub mod telemetry;

pub use config::Config;
pub use domain::{
    AsfalisError, Finding, Installation, InstallationId, Repo, RepoId, Result, ScanArtifact,
    ScanRun, ScanRunId, ScanStage, ScanStatus, Severity, StageName, Tool, Trigger,
    ARTIFACT_CODEQL, ARTIFACT_MERGED, ARTIFACT_OSV, ARTIFACT_SEMGREP, SARIF_MEDIA_TYPE,
};
pub use telemetry::{init_tracing, init_tracing_from_env};

/// Crate version, exposed for `--version` output in the CLI and daemon.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
