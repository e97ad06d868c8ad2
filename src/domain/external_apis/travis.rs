use crate::domain::errors::TravisError;
use crate::domain::models::build::{BuildResponse, UserInfo};
use crate::domain::models::entity::RepoSlug;
use async_trait::async_trait;

pub const DEFAULT_BUILDS_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBuildsRequest {
    pub repo_slug: RepoSlug,
    pub limit: u32,
    pub offset: u32,
}

impl GetBuildsRequest {
    pub fn new(repo_slug: RepoSlug) -> Self {
        Self {
            repo_slug,
            limit: DEFAULT_BUILDS_LIMIT,
            offset: 0,
        }
    }

    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

#[async_trait]
pub trait TravisCiApi: Send + Sync {
    async fn get_builds(&self, request: GetBuildsRequest)
    -> Result<Vec<BuildResponse>, TravisError>;
    async fn get_build(&self, build_id: u64) -> Result<BuildResponse, TravisError>;
    async fn retry(&self, build_id: u64) -> Result<(), TravisError>;
    async fn get_user(&self) -> Result<UserInfo, TravisError>;
}
