use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::{DiscoveryApi, IdentityApi};
use crate::domain::external_apis::travis::{GetBuildsRequest, TravisCiApi};
use crate::domain::models::build::{BuildResponse, UserInfo};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Service the host exposes the vendor API through.
const PROXY_PLUGIN_ID: &str = "proxy";
const PROXY_PATH: &str = "/travisci/api";

const API_VERSION_HEADER: &str = "Travis-API-Version";
const API_VERSION: &str = "3";

// `/repo/{slug}/builds` wraps the records in an object; the key is absent
// for repositories the caller can't see.
#[derive(Deserialize, Debug)]
struct TravisBuildsApiResponse {
    #[serde(default)]
    builds: Option<Vec<BuildResponse>>,
}

pub struct TravisCiApiClient {
    client: Client,
    discovery: Arc<dyn DiscoveryApi>,
    identity: Arc<dyn IdentityApi>,
}

impl TravisCiApiClient {
    pub fn new(discovery: Arc<dyn DiscoveryApi>, identity: Arc<dyn IdentityApi>) -> Self {
        Self {
            client: Client::new(),
            discovery,
            identity,
        }
    }

    async fn endpoint(&self, segments: &[&str]) -> Result<Url, TravisError> {
        let base = self.discovery.get_base_url(PROXY_PLUGIN_ID).await?;
        let mut url = Url::parse(&format!("{base}{PROXY_PATH}"))
            .map_err(|e| TravisError::Discovery(format!("invalid base URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| TravisError::Discovery(format!("base URL {base} cannot have a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        operation_name: &str,
        method: Method,
        url: Url,
    ) -> Result<Response, TravisError> {
        let mut request = self
            .client
            .request(method, url)
            .header(API_VERSION_HEADER, API_VERSION);
        if let Some(token) = self.identity.get_id_token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!("Request failed for {}: {}", operation_name, e);
            TravisError::request(None, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("API error for {}: {}", operation_name, status);
            return Err(TravisError::request(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or_default(),
            ));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation_name: &str,
        url: Url,
    ) -> Result<T, TravisError> {
        let response = self.send(operation_name, Method::GET, url).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| {
            tracing::warn!(
                "Failed to deserialize response for {}: {}",
                operation_name,
                e
            );
            TravisError::request(Some(status), format!("invalid response body: {e}"))
        })
    }
}

#[async_trait]
impl TravisCiApi for TravisCiApiClient {
    #[tracing::instrument(name = "TravisCiApiClient::get_builds", skip(self), fields(repo = %request.repo_slug))]
    async fn get_builds(
        &self,
        request: GetBuildsRequest,
    ) -> Result<Vec<BuildResponse>, TravisError> {
        let slug = request.repo_slug.to_string();
        let mut url = self.endpoint(&["repo", &slug, "builds"]).await?;
        url.query_pairs_mut()
            .append_pair("offset", &request.offset.to_string())
            .append_pair("limit", &request.limit.to_string());

        let api_response: TravisBuildsApiResponse =
            self.get_json(&format!("builds for {slug}"), url).await?;
        Ok(api_response.builds.unwrap_or_default())
    }

    #[tracing::instrument(name = "TravisCiApiClient::get_build", skip(self))]
    async fn get_build(&self, build_id: u64) -> Result<BuildResponse, TravisError> {
        let url = self.endpoint(&["build", &build_id.to_string()]).await?;
        self.get_json(&format!("build {build_id}"), url).await
    }

    #[tracing::instrument(name = "TravisCiApiClient::retry", skip(self))]
    async fn retry(&self, build_id: u64) -> Result<(), TravisError> {
        let url = self
            .endpoint(&["build", &build_id.to_string(), "restart"])
            .await?;
        self.send(&format!("restart of build {build_id}"), Method::POST, url)
            .await?;
        tracing::info!("Requested restart of build {}", build_id);
        Ok(())
    }

    #[tracing::instrument(name = "TravisCiApiClient::get_user", skip(self))]
    async fn get_user(&self) -> Result<UserInfo, TravisError> {
        let url = self.endpoint(&["user"]).await?;
        self.get_json("user", url).await
    }
}
