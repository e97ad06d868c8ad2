use crate::domain::external_apis::host::IdentityApi;
use async_trait::async_trait;

/// Identity whose token is fixed at startup; `None` means anonymous.
#[derive(Clone, Default)]
pub struct StaticIdentity {
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl std::fmt::Debug for StaticIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIdentity")
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl IdentityApi for StaticIdentity {
    async fn get_id_token(&self) -> Option<String> {
        self.token.clone()
    }
}
