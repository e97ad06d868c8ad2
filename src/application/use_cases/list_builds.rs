use crate::application::settings_store::SettingsStore;
use crate::application::view_model::transform;
use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::ErrorApi;
use crate::domain::external_apis::travis::{GetBuildsRequest, TravisCiApi};
use crate::domain::models::build::{
    Build, BuildResponse, BuildsPage, PageCursor, RestartBuild, UserInfo,
};
use crate::domain::models::entity::RepoSlug;
use crate::domain::models::settings::CiDomain;
use async_trait::async_trait;
use std::sync::Arc;

/// Rows per page until the user picks another size.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Restarts builds on behalf of rendered rows. Failures go to the error sink.
pub struct ApiRestarter<A: TravisCiApi + 'static> {
    api: Arc<A>,
    error_api: Arc<dyn ErrorApi>,
}

impl<A: TravisCiApi + 'static> ApiRestarter<A> {
    pub fn new(api: Arc<A>, error_api: Arc<dyn ErrorApi>) -> Self {
        Self { api, error_api }
    }
}

#[async_trait]
impl<A: TravisCiApi + 'static> RestartBuild for ApiRestarter<A> {
    async fn restart_build(&self, build_id: u64) {
        if let Err(e) = self.api.retry(build_id).await {
            self.error_api.post(&e);
        }
    }
}

/// Paginated build list for one repository, plus the actions its rows offer.
pub struct ListBuildsInteractor<A: TravisCiApi + 'static> {
    api: Arc<A>,
    settings: Arc<SettingsStore>,
    error_api: Arc<dyn ErrorApi>,
    restarter: Arc<dyn RestartBuild>,
}

impl<A: TravisCiApi + 'static> ListBuildsInteractor<A> {
    pub fn new(api: Arc<A>, settings: Arc<SettingsStore>, error_api: Arc<dyn ErrorApi>) -> Self {
        let restarter = Arc::new(ApiRestarter::new(Arc::clone(&api), Arc::clone(&error_api)));
        Self {
            api,
            settings,
            error_api,
            restarter,
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    async fn get_builds(
        &self,
        slug: &RepoSlug,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<BuildResponse>, TravisError> {
        let request = GetBuildsRequest::new(slug.clone()).with_page(limit, offset);
        self.api.get_builds(request).await
    }

    /// Rows for vendor records of `slug`, linked to `ci_domain`'s web UI.
    pub fn transform(
        &self,
        slug: &RepoSlug,
        ci_domain: CiDomain,
        builds: &[BuildResponse],
    ) -> Vec<Build> {
        transform(builds, &self.restarter, &ci_domain.base_url(), &slug.to_string())
    }

    /// The list endpoint reports no total, so the newest build's number stands in for it.
    pub(crate) async fn load_total(&self, slug: &RepoSlug) -> Result<u64, TravisError> {
        let newest = self.get_builds(slug, 1, 0).await?;
        Ok(newest
            .first()
            .and_then(|build| build.number.trim().parse().ok())
            .unwrap_or(0))
    }

    /// One page of rows against an already known total. Failures are left to the caller.
    pub(crate) async fn load_rows(
        &self,
        slug: &RepoSlug,
        ci_domain: CiDomain,
        page: u32,
        page_size: u32,
        known_total: u64,
    ) -> Result<BuildsPage, TravisError> {
        let mut cursor = PageCursor {
            page,
            page_size: page_size.max(1),
            total: known_total,
        };
        let responses = self
            .get_builds(slug, cursor.page_size, cursor.offset())
            .await?;
        cursor.total = cursor.total.max(u64::from(cursor.offset()) + responses.len() as u64);
        tracing::debug!("Fetched {} builds (total {})", responses.len(), cursor.total);

        Ok(BuildsPage {
            cursor,
            builds: self.transform(slug, ci_domain, &responses),
        })
    }

    async fn load_page(
        &self,
        slug: &RepoSlug,
        ci_domain: CiDomain,
        page: u32,
        page_size: u32,
    ) -> Result<BuildsPage, TravisError> {
        let total = self.load_total(slug).await?;
        self.load_rows(slug, ci_domain, page, page_size, total).await
    }

    /// Page of builds for `slug`, linked to the configured CI domain.
    #[tracing::instrument(name = "ListBuildsInteractor::fetch_page", skip(self, slug), fields(repo = %slug))]
    pub async fn fetch_page(
        &self,
        slug: &RepoSlug,
        page: u32,
        page_size: u32,
    ) -> Result<BuildsPage, TravisError> {
        let ci_domain = self.settings.get_settings().settings.ci_domain;
        self.load_page(slug, ci_domain, page, page_size)
            .await
            .inspect_err(|e| self.error_api.post(e))
    }

    /// Page of builds for the repository named in the saved settings. Slug and
    /// domain come from the same snapshot.
    #[tracing::instrument(name = "ListBuildsInteractor::fetch_configured_page", skip(self))]
    pub async fn fetch_configured_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<BuildsPage, TravisError> {
        let (slug, ci_domain) = self.settings.ready_repo()?;
        self.load_page(&slug, ci_domain, page, page_size)
            .await
            .inspect_err(|e| self.error_api.post(e))
    }

    /// Newest build, as shown on the overview card.
    pub async fn latest_build(&self, slug: &RepoSlug) -> Result<Option<Build>, TravisError> {
        let ci_domain = self.settings.get_settings().settings.ci_domain;
        let responses = self
            .get_builds(slug, DEFAULT_PAGE_SIZE, 0)
            .await
            .inspect_err(|e| self.error_api.post(e))?;
        Ok(self.transform(slug, ci_domain, &responses).into_iter().next())
    }

    pub async fn restart_build(&self, build_id: u64) {
        self.restarter.restart_build(build_id).await;
    }

    /// Vendor-side identity of the caller; diagnostic only.
    pub async fn current_user(&self) -> Result<UserInfo, TravisError> {
        self.api
            .get_user()
            .await
            .inspect_err(|e| self.error_api.post(e))
    }
}
