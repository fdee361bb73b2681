//! Worker configuration

use crate::error::{Result, WorkerError};
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Subscription carrying bucket notifications (id or full path)
    pub topic: String,

    /// Cache-Control directive applied to every announced object
    pub cache_control: String,

    /// Google Cloud project owning the subscription
    pub project_id: String,

    /// Upper bound on draining once shutdown starts. Pending updates are
    /// abandoned up to 2 seconds before it so their messages can be rejected.
    pub shutdown_timeout: Duration,

    /// Maximum number of messages handled concurrently
    pub max_in_flight: usize,

    /// Maximum number of messages requested per pull
    pub max_messages: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            cache_control: String::new(),
            project_id: String::new(),
            shutdown_timeout: Duration::from_secs(60),
            max_in_flight: 10,
            max_messages: 100,
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Check the config before any backend client is created
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("topic", &self.topic),
            ("cache-control", &self.cache_control),
            ("project-id", &self.project_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(flag, _)| flag)
        .collect();

        if !missing.is_empty() {
            return Err(WorkerError::Config(format!(
                "topic, cache-control, and project-id are required (missing: {})",
                missing.join(", ")
            )));
        }

        if self.max_in_flight == 0 {
            return Err(WorkerError::Config(
                "max-in-flight must be greater than zero".to_string(),
            ));
        }
        if self.max_messages == 0 {
            return Err(WorkerError::Config(
                "max-messages must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set the subscription to listen on
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.config.topic = topic.into();
        self
    }

    /// Set the Cache-Control directive
    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.config.cache_control = value.into();
        self
    }

    /// Set the project ID
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project_id = project_id.into();
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, duration: Duration) -> Self {
        self.config.shutdown_timeout = duration;
        self
    }

    /// Set the concurrent handler limit
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// Set the pull batch size
    pub fn max_messages(mut self, max: usize) -> Self {
        self.config.max_messages = max;
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> WorkerConfigBuilder {
        WorkerConfig::builder()
            .topic("bucket-events")
            .cache_control("no-cache")
            .project_id("my-project")
    }

    #[test]
    fn test_defaults() {
        let config = valid().build();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(config.max_in_flight, 10);
        assert_eq!(config.max_messages, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_each_required_field() {
        for config in [
            valid().topic("").build(),
            valid().cache_control("").build(),
            valid().project_id("  ").build(),
        ] {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, WorkerError::Config(_)));
        }
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = WorkerConfig::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing: topic, cache-control, project-id"));
    }

    #[test]
    fn test_limits_must_be_positive() {
        assert!(valid().max_in_flight(0).build().validate().is_err());
        assert!(valid().max_messages(0).build().validate().is_err());
    }
}
