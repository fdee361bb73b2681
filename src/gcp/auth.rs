//! Access tokens for Google APIs

use std::fmt;
use std::sync::Arc;

use gcp_auth::TokenProvider;

use crate::error::{Result, WorkerError};

/// Where bearer tokens come from
#[derive(Clone)]
pub enum TokenSource {
    /// Application default credentials discovered by `gcp_auth`
    Google(Arc<dyn TokenProvider>),
    /// No credentials; used against emulators
    Anonymous,
}

impl TokenSource {
    /// Discover credentials from the environment (service account file,
    /// gcloud user credentials, or the metadata server).
    pub async fn discover() -> Result<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| {
            WorkerError::Backend(format!("failed to initialize GCP authentication: {e}"))
        })?;

        Ok(Self::Google(provider))
    }

    /// Bearer token for the given scopes, or `None` for anonymous access
    pub async fn bearer(&self, scopes: &[&str]) -> std::result::Result<Option<String>, String> {
        match self {
            Self::Google(provider) => provider
                .token(scopes)
                .await
                .map(|token| Some(token.as_str().to_string()))
                .map_err(|e| format!("failed to get GCP access token: {e}")),
            Self::Anonymous => Ok(None),
        }
    }
}

// Manual Debug implementation since TokenProvider doesn't implement Debug
impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Google(_) => f.write_str("TokenSource::Google(<TokenProvider>)"),
            Self::Anonymous => f.write_str("TokenSource::Anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_has_no_token() {
        let token = TokenSource::Anonymous.bearer(&["scope"]).await.unwrap();
        assert!(token.is_none());
    }
}
