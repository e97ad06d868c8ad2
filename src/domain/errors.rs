use thiserror::Error;

/// Annotation an entity must carry for the plugin to know which repository to query.
pub const TRAVIS_ANNOTATION: &str = "travis-ci.com/repo-slug";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TravisError {
    /// Non-success HTTP status, transport failure or undecodable body.
    /// `status` is `None` when no response was received at all.
    #[error("{}", request_message(*.status, .status_text))]
    Request {
        status: Option<u16>,
        status_text: String,
    },
    #[error("No credentials provided")]
    MissingCredentials,
    #[error("Missing annotation '{annotation}'")]
    MissingAnnotation { annotation: &'static str },
    #[error("Failed to resolve service endpoint: {0}")]
    Discovery(String),
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl TravisError {
    pub fn request(status: Option<u16>, status_text: impl Into<String>) -> Self {
        Self::Request {
            status,
            status_text: status_text.into(),
        }
    }

    pub fn missing_annotation() -> Self {
        Self::MissingAnnotation {
            annotation: TRAVIS_ANNOTATION,
        }
    }
}

fn request_message(status: Option<u16>, status_text: &str) -> String {
    match status {
        Some(code) => format!("Request failed with {code} {status_text}"),
        None => format!("Request failed: {status_text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_carries_status_in_message() {
        let err = TravisError::request(Some(404), "Not Found");
        assert_eq!(err.to_string(), "Request failed with 404 Not Found");
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = TravisError::request(None, "connection refused");
        assert_eq!(err.to_string(), "Request failed: connection refused");
    }

    #[test]
    fn missing_annotation_names_the_annotation() {
        assert_eq!(
            TravisError::missing_annotation().to_string(),
            "Missing annotation 'travis-ci.com/repo-slug'"
        );
    }
}
