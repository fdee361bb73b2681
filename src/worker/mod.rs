//! Worker module for consuming bucket notifications
//!
//! This module provides:
//! - Worker: Receive loop that pulls messages and drains on shutdown
//! - EventHandler: Handles individual messages (decode + metadata update + ack/nack)
//! - WorkerConfig: Configuration for the worker
//! - RetryPolicy: Backoff for transient receive failures
//! - ShutdownHandle: Cancellation shared by the loop and the signal watcher

pub mod config;
pub mod handler;
pub mod retry;
pub mod runner;
pub mod shutdown;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use handler::{EventHandler, Outcome};
pub use retry::RetryPolicy;
pub use runner::{Worker, WorkerState};
pub use shutdown::{setup_signal_handler, ShutdownHandle};
