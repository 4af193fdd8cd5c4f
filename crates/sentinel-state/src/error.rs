//! Error types for sentinel-state

use thiserror::Error;

/// Errors raised by the repository state store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The repository was never registered.
    #[error("repository not registered: {url}")]
    NotRegistered { url: String },

    /// The repository URL could not be parsed into owner/name.
    #[error("invalid repository url: {url}")]
    InvalidUrl { url: String },
}

/// Errors raised by a repository hosting backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Branch, commit or repository does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials missing or insufficient for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A branch with the requested name already exists.
    #[error("reference already exists: {0}")]
    RefExists(String),

    /// A ref update would not be a fast-forward and was refused.
    #[error("non-fast-forward update refused for {0}")]
    NonFastForward(String),

    /// The request did not complete within the client timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Any other non-success API response.
    #[error("hosting API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_names_the_url() {
        let err = StoreError::NotRegistered {
            url: "https://github.com/acme/widgets".to_string(),
        };
        assert!(err.to_string().contains("acme/widgets"));
    }

    #[test]
    fn host_error_display() {
        let err = HostError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));
        assert!(HostError::Timeout(15).to_string().contains("15s"));
    }
}
