//! Error types for the catalog store.

use thiserror::Error;

/// Errors raised by the catalog store.
///
/// Claim-time failures (`Connection`, `Query`) are logged by the dispatcher
/// and retried on the next poll; everything else is folded into a run's
/// `error_message` by the caller.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Database query error.
    #[error("database query failed: {0}")]
    Query(String),

    /// Run not found in the catalog.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Stage row not found when closing a stage.
    #[error("stage not found: run {run_id} stage {stage}")]
    StageNotFound { run_id: String, stage: String },

    /// Run is not in a valid state for the requested transition.
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// Schema bootstrap/migration error.
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),

    /// Serialization/deserialization error.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::RunNotFound {
                run_id: "<unknown>".to_string(),
            },
            other => StorageError::Query(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_run_state_message_names_both_states() {
        let err = StorageError::InvalidRunState {
            run_id: "r1".into(),
            status: "completed".into(),
            expected: "running".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("running"));
    }
}
