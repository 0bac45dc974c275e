//! Token broker boundary.
//!
//! Installation-token issuance against the hosted code platform's App API is
//! an external collaborator; this crate only depends on the opaque contract
//! `issue_token(installation_id) -> token`.

use async_trait::async_trait;

use asfalis_core::InstallationId;

use crate::error::FetchResult;

#[async_trait]
pub trait TokenBroker: Send + Sync {
    async fn issue_token(&self, installation_id: InstallationId) -> FetchResult<String>;
}
