use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{TRAVIS_ANNOTATION, TravisError};

/// Catalog entity as handed over by the host portal. Only the metadata is consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    pub metadata: EntityMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Entity {
    pub fn is_travisci_available(&self) -> bool {
        self.repo_slug().is_ok()
    }

    pub fn repo_slug(&self) -> Result<RepoSlug, TravisError> {
        self.metadata
            .annotations
            .get(TRAVIS_ANNOTATION)
            .and_then(|value| RepoSlug::parse(value))
            .ok_or_else(TravisError::missing_annotation)
    }
}

/// `owner/repo` identifying the repository on the CI service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (owner, repo) = value.trim().split_once('/')?;
        let (owner, repo) = (owner.trim(), repo.trim());
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo))
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
