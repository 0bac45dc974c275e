//! Repository archive fetching for the `fetch_repo` pipeline stage.

pub mod archive;
pub mod error;
pub mod token;

pub use archive::{download_tarball, extract_tarball};
pub use error::{FetchError, FetchResult};
pub use token::TokenBroker;
