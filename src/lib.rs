//! Cache Control Worker - applies a Cache-Control directive to storage objects
//!
//! The worker listens on a Pub/Sub subscription fed by bucket notifications.
//! For every notification it patches the referenced object's `Cache-Control`
//! metadata, acknowledging the message on success and rejecting it (so the
//! subscription redelivers it) on any failure.
//!
//! Backends sit behind two traits, [`ObjectStore`] and [`MessageChannel`];
//! [`gcp`] holds the Google Cloud implementations.

pub mod channel;
pub mod error;
pub mod event;
pub mod gcp;
pub mod store;
pub mod worker;

pub use channel::{Acknowledger, ChannelError, Message, MessageChannel};
pub use error::{Result, WorkerError};
pub use event::{DecodeError, Event};
pub use store::{MetadataUpdate, ObjectMetadata, ObjectStore, StoreError};
pub use worker::{
    setup_signal_handler, EventHandler, Outcome, RetryPolicy, ShutdownHandle, Worker, WorkerConfig,
    WorkerState,
};
