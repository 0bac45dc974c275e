//! Top-level domain error taxonomy.
//!
//! This is the error a scan run terminates with. It is deliberately small:
//! individual scanner and normalizer failures never reach this type, they
//! are absorbed into `ScanStage.error_message` by the pipeline engine. Only
//! conditions that abort a run belong here.

/// Errors that legitimately abort a scan run.
#[derive(Debug, thiserror::Error)]
pub enum AsfalisError {
    #[error("token issuance failed: {0}")]
    TokenIssuance(String),

    #[error("Archive exceeds max size ({limit} bytes)")]
    ArchiveTooLarge { limit: u64 },

    #[error("archive extraction failed: {0}")]
    ArchiveExtraction(String),

    #[error("Job timeout")]
    JobTimeout,

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("run not found: {0}")]
    RunNotFound(uuid::Uuid),

    #[error("invalid run state: {run_id} is {actual}, expected {expected}")]
    InvalidRunState {
        run_id: uuid::Uuid,
        actual: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, AsfalisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_too_large_message() {
        let err = AsfalisError::ArchiveTooLarge { limit: 52_428_800 };
        assert!(err.to_string().contains("52428800"));
    }

    #[test]
    fn job_timeout_message_matches_result_summary_contract() {
        assert_eq!(AsfalisError::JobTimeout.to_string(), "Job timeout");
    }

    #[test]
    fn run_not_found_includes_id() {
        let id = uuid::Uuid::new_v4();
        let err = AsfalisError::RunNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
