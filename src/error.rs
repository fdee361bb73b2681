//! Error types for cache-control-worker

use thiserror::Error;

use crate::channel::ChannelError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend client error: {0}")]
    Backend(String),

    #[error("Cannot consume message: {0}")]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
