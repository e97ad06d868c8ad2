//! Collaborators provided by the host portal.

use crate::domain::errors::TravisError;
use async_trait::async_trait;

#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Token of the signed-in user, if any.
    async fn get_id_token(&self) -> Option<String>;
}

#[async_trait]
pub trait DiscoveryApi: Send + Sync {
    async fn get_base_url(&self, plugin_id: &str) -> Result<String, TravisError>;
}

/// Sink for failures that should reach the user without failing the caller.
pub trait ErrorApi: Send + Sync {
    fn post(&self, error: &TravisError);
}

pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), TravisError>;
}
