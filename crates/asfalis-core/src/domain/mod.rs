//! Domain models for the scan orchestration core.
//!
//! Canonical definitions for the core entities:
//! - `Installation` / `Repo`: the catalog an external webhook ingester maintains
//! - `ScanRun` / `ScanStage`: the job queue and pipeline lifecycle
//! - `Finding`: a severity-normalized diagnostic, tool-agnostic
//! - `ScanArtifact`: a stored copy of a tool's raw structured-log output

pub mod artifact;
pub mod catalog;
pub mod error;
pub mod finding;
pub mod ids;
pub mod scan;

pub use artifact::{ScanArtifact, ARTIFACT_CODEQL, ARTIFACT_MERGED, ARTIFACT_OSV, ARTIFACT_SEMGREP, SARIF_MEDIA_TYPE};
pub use catalog::{Installation, Repo};
pub use error::{AsfalisError, Result};
pub use finding::{Finding, Severity, Tool};
pub use ids::{InstallationId, RepoId, ScanRunId};
pub use scan::{ScanRun, ScanStage, ScanStatus, StageName, Trigger};
