use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::ErrorApi;

/// Reports posted errors through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorApi;

impl ErrorApi for TracingErrorApi {
    fn post(&self, error: &TravisError) {
        tracing::error!(error = %error, "Travis CI plugin error");
    }
}
