//! Installation-token issuance against the hosted code platform's App API.
//!
//! This is the concrete [`TokenBroker`] the core depends on only through its
//! opaque `issue_token` contract; its design (JWT claims, token endpoint) is
//! out of scope for the scan orchestration core itself, but something has to
//! implement the trait in production.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use asfalis_core::InstallationId;
use asfalis_fetch::{FetchError, FetchResult, TokenBroker};

#[derive(Debug, Serialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: Option<String>,
}

/// Issues short-lived installation tokens by signing an App JWT (RS256) and
/// exchanging it for an access token, mirroring the original source's
/// `get_installation_token`.
pub struct GithubAppTokenBroker {
    app_id: String,
    encoding_key: EncodingKey,
    client: reqwest::Client,
}

impl GithubAppTokenBroker {
    pub fn new(app_id: String, private_key_pem: &str) -> FetchResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| FetchError::TokenIssuance(format!("invalid private key: {e}")))?;
        Ok(Self {
            app_id,
            encoding_key,
            client: reqwest::Client::new(),
        })
    }

    /// Builds from `GITHUB_APP_ID` and either `GITHUB_PRIVATE_KEY` (raw PEM,
    /// with literal `\n` sequences unescaped) or a file at
    /// `GITHUB_PRIVATE_KEY_PATH`. Returns `None` if either is absent —
    /// callers that don't need token issuance (e.g. a dispatcher run against
    /// seeded fixtures) can skip constructing a broker at all.
    pub fn from_env() -> FetchResult<Option<Self>> {
        let Ok(app_id) = std::env::var("GITHUB_APP_ID") else {
            return Ok(None);
        };
        let Some(pem) = Self::private_key_from_env() else {
            return Ok(None);
        };
        Self::new(app_id, &pem).map(Some)
    }

    fn private_key_from_env() -> Option<String> {
        if let Ok(raw) = std::env::var("GITHUB_PRIVATE_KEY") {
            return Some(raw.trim().replace("\\n", "\n"));
        }
        let path = std::env::var("GITHUB_PRIVATE_KEY_PATH").ok()?;
        std::fs::read_to_string(path).ok()
    }

    fn sign_app_jwt(&self) -> FetchResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| FetchError::TokenIssuance(e.to_string()))?
            .as_secs() as i64;
        let claims = AppJwtClaims {
            iat: now - 60,
            exp: now + 600,
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| FetchError::TokenIssuance(e.to_string()))
    }
}

#[async_trait]
impl TokenBroker for GithubAppTokenBroker {
    #[instrument(skip(self))]
    async fn issue_token(&self, installation_id: InstallationId) -> FetchResult<String> {
        let jwt = self.sign_app_jwt()?;
        let url = format!(
            "https://api.github.com/app/installations/{}/access_tokens",
            installation_id.0
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FetchError::TokenIssuance(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::TokenIssuance(format!(
                "GitHub token failed: {}",
                response.status()
            )));
        }

        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::TokenIssuance(e.to_string()))?;
        body.token
            .ok_or_else(|| FetchError::TokenIssuance("no token in GitHub response".to_string()))
    }
}
