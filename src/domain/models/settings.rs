use serde::{Deserialize, Serialize};

use crate::domain::errors::TravisError;
use crate::domain::models::entity::RepoSlug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CiDomain {
    #[default]
    #[serde(rename = "travis-ci.com")]
    TravisCiCom,
    #[serde(rename = "travis-ci.org")]
    TravisCiOrg,
}

impl CiDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TravisCiCom => "travis-ci.com",
            Self::TravisCiOrg => "travis-ci.org",
        }
    }

    /// Public web UI root, used as the prefix of every build link.
    pub fn base_url(self) -> String {
        format!("https://{}/", self.as_str())
    }
}

/// User-supplied repository identity. This is the persisted shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub owner: String,
    pub repo: String,
    pub token: String,
    #[serde(default)]
    pub ci_domain: CiDomain,
}

impl Settings {
    /// Owner, repo and token must all be present before anything is queried.
    pub fn is_ready(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty() && !self.token.is_empty()
    }

    pub fn repo_slug(&self) -> Result<RepoSlug, TravisError> {
        if !self.is_ready() {
            return Err(TravisError::MissingCredentials);
        }
        Ok(RepoSlug::new(self.owner.clone(), self.repo.clone()))
    }
}

/// In-memory state: the settings plus the transient dialog flag, which is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsState {
    #[serde(flatten)]
    pub settings: Settings,
    pub show_settings_dialog: bool,
}
