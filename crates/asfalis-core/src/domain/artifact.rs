//! Stored copies of tool output and the merged result document.

use serde::{Deserialize, Serialize};

use super::ids::ScanRunId;

/// Media type persisted for every [`ScanArtifact`].
pub const SARIF_MEDIA_TYPE: &str = "application/sarif+json";

/// Stable artifact names written by the pipeline.
pub const ARTIFACT_OSV: &str = "osv.sarif";
pub const ARTIFACT_SEMGREP: &str = "semgrep.sarif";
pub const ARTIFACT_CODEQL: &str = "codeql.sarif";
pub const ARTIFACT_MERGED: &str = "merged.sarif";

/// A single stored structured-log document belonging to a [`ScanRun`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanArtifact {
    pub run_id: ScanRunId,
    pub name: String,
    pub content_type: String,
    pub content: String,
}

impl ScanArtifact {
    pub fn new(run_id: ScanRunId, name: impl Into<String>, content: String) -> Self {
        Self {
            run_id,
            name: name.into(),
            content_type: SARIF_MEDIA_TYPE.to_string(),
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_artifact_defaults_to_sarif_media_type() {
        let artifact = ScanArtifact::new(ScanRunId::new(), ARTIFACT_MERGED, "{}".to_string());
        assert_eq!(artifact.content_type, SARIF_MEDIA_TYPE);
        assert_eq!(artifact.name, "merged.sarif");
    }
}
