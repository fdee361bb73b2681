//! Google Cloud backends
//!
//! Both clients talk to the public REST APIs with `reqwest` and obtain
//! bearer tokens through `gcp_auth`. Setting `STORAGE_EMULATOR_HOST` or
//! `PUBSUB_EMULATOR_HOST` points the matching client at a local emulator
//! and disables authentication, as the official client libraries do.

pub mod auth;
pub mod pubsub;
pub mod storage;

pub use auth::TokenSource;
pub use pubsub::PubSubClient;
pub use storage::GcsClient;

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WorkerError};

/// Google API error envelope
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Fields used for deserialization
struct GoogleError {
    code: i32,
    message: String,
    #[serde(default)]
    status: String,
}

/// Build the shared HTTP client for one backend
fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| WorkerError::Backend(format!("cannot create HTTP client: {e}")))
}

/// Resolve the endpoint for a backend: the emulator host when set, else the default.
fn resolve_endpoint(emulator_host: Option<String>, default: &str) -> (String, bool) {
    match emulator_host
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
    {
        Some(host) => (normalize_endpoint(&host), true),
        None => (default.to_string(), false),
    }
}

/// Emulator hosts are usually given as `host:port`
fn normalize_endpoint(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Pull the human-readable message out of an error response
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<GoogleErrorResponse>(&body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_endpoint_defaults() {
        let (endpoint, emulated) = resolve_endpoint(None, "https://pubsub.googleapis.com");
        assert_eq!(endpoint, "https://pubsub.googleapis.com");
        assert!(!emulated);

        let (endpoint, emulated) =
            resolve_endpoint(Some("  ".to_string()), "https://pubsub.googleapis.com");
        assert_eq!(endpoint, "https://pubsub.googleapis.com");
        assert!(!emulated);
    }

    #[test]
    fn test_resolve_endpoint_emulator() {
        let (endpoint, emulated) =
            resolve_endpoint(Some("localhost:8085".to_string()), "https://unused");
        assert_eq!(endpoint, "http://localhost:8085");
        assert!(emulated);

        let (endpoint, _) =
            resolve_endpoint(Some("http://127.0.0.1:4443/".to_string()), "https://unused");
        assert_eq!(endpoint, "http://127.0.0.1:4443");
    }
}
