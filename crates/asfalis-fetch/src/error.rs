//! Errors for token issuance, archive download, and extraction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("installation token issuance failed: {0}")]
    TokenIssuance(String),

    #[error("archive request failed: {0}")]
    Http(String),

    #[error("archive exceeds max size ({limit} bytes)")]
    ArchiveTooLarge { limit: u64 },

    #[error("archive extraction failed: {0}")]
    Extraction(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
