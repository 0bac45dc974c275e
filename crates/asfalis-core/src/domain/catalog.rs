//! Installation and Repo catalog entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{InstallationId, RepoId};

/// A hosted code platform App installation, owning zero or more [`Repo`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Installation {
    pub installation_id: InstallationId,
    pub account_login: String,
    pub account_type: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// A single repository registered under an [`Installation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    pub repo_id: RepoId,
    pub installation_id: InstallationId,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub default_branch: Option<String>,
    pub is_private: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_serde_roundtrip() {
        let repo = Repo {
            repo_id: RepoId(42),
            installation_id: InstallationId(7),
            owner: "acme".into(),
            name: "app".into(),
            full_name: "acme/app".into(),
            default_branch: Some("main".into()),
            is_private: false,
            archived: false,
            created_at: Utc::now(),
            last_synced_at: None,
        };
        let json = serde_json::to_string(&repo).expect("serialize");
        let back: Repo = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(repo, back);
    }
}
