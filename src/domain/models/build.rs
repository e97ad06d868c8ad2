use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build record as returned by the Travis API v3. Only `number` and `state` are
/// relied upon; everything else may be missing from a given representation.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct BuildResponse {
    #[serde(rename = "@href", default)]
    pub href: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub previous_state: Option<String>,
    #[serde(default)]
    pub pull_request_title: Option<String>,
    #[serde(default)]
    pub pull_request_number: Option<u64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub branch: Option<BranchRef>,
    #[serde(default)]
    pub tag: Option<serde_json::Value>,
    #[serde(default)]
    pub commit: Option<CommitRef>,
    #[serde(default)]
    pub created_by: Option<UserRef>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RepositoryRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct BranchRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct CommitRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub sha: String,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub compare_url: String,
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct UserRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub login: String,
}

/// Vendor-side identity of the caller.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Action bound to a rendered row; implemented by whatever owns the API client.
#[async_trait]
pub trait RestartBuild: Send + Sync {
    async fn restart_build(&self, build_id: u64);
}

/// Restart callback bound to one vendor record. A record without an id can't be
/// restarted, so clicking it does nothing.
#[derive(Clone)]
pub struct RestartHandle {
    build_id: Option<u64>,
    restart: Arc<dyn RestartBuild>,
}

impl RestartHandle {
    pub fn new(build_id: Option<u64>, restart: Arc<dyn RestartBuild>) -> Self {
        Self { build_id, restart }
    }

    /// Returns whether the callback was invoked.
    pub async fn on_restart_click(&self) -> bool {
        match self.build_id {
            Some(id) => {
                self.restart.restart_build(id).await;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for RestartHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartHandle")
            .field("build_id", &self.build_id)
            .finish_non_exhaustive()
    }
}

/// Indicator bucket drawn next to a status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    Pending,
    Running,
    Error,
    Ok,
    Warning,
}

/// Row shown in the builds table and on the overview card.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    /// Human-facing build number.
    pub id: String,
    pub build_id: Option<u64>,
    pub build_name: String,
    pub source: BuildSource,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Option<u64>,
    pub raw_status: String,
    pub status: String,
    pub status_kind: StatusKind,
    pub build_url: String,
    #[serde(skip)]
    pub restart: RestartHandle,
}

impl Build {
    pub async fn on_restart_click(&self) -> bool {
        self.restart.on_restart_click().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    pub branch_name: String,
    pub commit: CommitInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl PageCursor {
    pub fn offset(&self) -> u32 {
        self.page.saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildsPage {
    pub cursor: PageCursor,
    pub builds: Vec<Build>,
}
