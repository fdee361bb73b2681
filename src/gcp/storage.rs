//! Cloud Storage JSON API client

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{error_message, http_client, resolve_endpoint, TokenSource};
use crate::error::Result;
use crate::store::{MetadataUpdate, ObjectMetadata, ObjectStore, StoreError};

/// Default Cloud Storage endpoint
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Environment variable naming a storage emulator (`host:port`)
pub const STORAGE_EMULATOR_HOST: &str = "STORAGE_EMULATOR_HOST";

const STORAGE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloud Storage client limited to object metadata patches
#[derive(Debug, Clone)]
pub struct GcsClient {
    client: reqwest::Client,
    endpoint: String,
    tokens: TokenSource,
}

impl GcsClient {
    /// Create a client with explicit parts
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Create a client from the environment.
    ///
    /// Uses the emulator named by `STORAGE_EMULATOR_HOST` without credentials
    /// when set, otherwise the public endpoint with discovered credentials.
    pub async fn from_env() -> Result<Self> {
        let (endpoint, emulated) = resolve_endpoint(
            std::env::var(STORAGE_EMULATOR_HOST).ok(),
            DEFAULT_STORAGE_ENDPOINT,
        );

        let tokens = if emulated {
            info!(endpoint = %endpoint, "Using storage emulator");
            TokenSource::Anonymous
        } else {
            TokenSource::discover().await?
        };

        Ok(Self::new(http_client(REQUEST_TIMEOUT)?, endpoint, tokens))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resource URL of an object; the name is encoded as a single path segment.
    pub fn object_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(bucket),
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn update_metadata(
        &self,
        bucket: &str,
        name: &str,
        update: &MetadataUpdate,
    ) -> std::result::Result<ObjectMetadata, StoreError> {
        let url = self.object_url(bucket, name);
        debug!(bucket = %bucket, name = %name, "Patching object metadata");

        let mut request = self.client.patch(&url).json(update);
        if let Some(token) = self
            .tokens
            .bearer(STORAGE_SCOPES)
            .await
            .map_err(StoreError::Auth)?
        {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        Ok(response.json::<ObjectMetadata>().await?)
    }
}
