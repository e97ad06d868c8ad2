use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::DiscoveryApi;
use async_trait::async_trait;

const PLUGIN_ID_PLACEHOLDER: &str = "{{pluginId}}";

/// Resolves service base URLs by substituting the plugin id into a fixed pattern,
/// e.g. `http://localhost:7007/api/{{pluginId}}`.
#[derive(Debug, Clone)]
pub struct UrlPatternDiscovery {
    pattern: String,
}

impl UrlPatternDiscovery {
    /// A pattern without the placeholder resolves every plugin id to the same URL.
    pub fn compile(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

#[async_trait]
impl DiscoveryApi for UrlPatternDiscovery {
    async fn get_base_url(&self, plugin_id: &str) -> Result<String, TravisError> {
        if plugin_id.is_empty() {
            return Err(TravisError::Discovery("empty plugin id".into()));
        }
        let url = self.pattern.replace(PLUGIN_ID_PLACEHOLDER, plugin_id);
        Ok(url.trim_end_matches('/').to_string())
    }
}
