//! Object store abstraction
//!
//! The worker only ever needs one storage operation: patch the metadata of a
//! single object. [`ObjectStore`] is that seam; `gcp::GcsClient` is the
//! production implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata fields to change on an object.
///
/// Fields left as `None` are omitted from the request and stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl MetadataUpdate {
    /// An update that only sets the `Cache-Control` directive
    pub fn cache_control(value: impl Into<String>) -> Self {
        Self {
            cache_control: Some(value.into()),
        }
    }
}

/// Object metadata as returned after an update
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub bucket: String,
    pub name: String,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub metageneration: Option<String>,
    #[serde(default)]
    pub cache_control: Option<String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage authentication failed: {0}")]
    Auth(String),

    #[error("update cancelled by shutdown")]
    Cancelled,
}

/// Storage backend capable of updating object metadata
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Apply `update` to the object `name` in `bucket`.
    async fn update_metadata(
        &self,
        bucket: &str,
        name: &str,
        update: &MetadataUpdate,
    ) -> Result<ObjectMetadata, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_serializes_only_set_fields() {
        let body = serde_json::to_value(MetadataUpdate::cache_control("no-cache")).unwrap();
        assert_eq!(body, serde_json::json!({ "cacheControl": "no-cache" }));

        let empty = serde_json::to_value(MetadataUpdate::default()).unwrap();
        assert_eq!(empty, serde_json::json!({}));
    }

    #[test]
    fn test_object_metadata_from_resource() {
        let resource = r#"{
            "kind": "storage#object",
            "bucket": "b1",
            "name": "obj.png",
            "generation": "1700000000000000",
            "metageneration": "2",
            "cacheControl": "no-cache",
            "updated": "2024-01-15T10:30:00.000Z"
        }"#;

        let meta: ObjectMetadata = serde_json::from_str(resource).unwrap();
        assert_eq!(meta.bucket, "b1");
        assert_eq!(meta.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(meta.metageneration.as_deref(), Some("2"));
        assert!(meta.updated.is_some());
    }
}
