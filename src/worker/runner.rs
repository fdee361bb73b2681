//! Worker - main receive loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::channel::{Message, MessageChannel};
use crate::error::{Result, WorkerError};
use crate::store::ObjectStore;
use crate::worker::{EventHandler, Outcome, RetryPolicy, WorkerConfig};

/// Part of the shutdown timeout reserved for handlers to reject their
/// message once pending updates are abandoned. Never more than half the
/// timeout.
const NACK_GRACE: Duration = Duration::from_secs(2);

/// Split the shutdown timeout into the drain budget and the nack grace.
fn drain_budget(shutdown_timeout: Duration) -> (Duration, Duration) {
    let grace = NACK_GRACE.min(shutdown_timeout / 2);
    (shutdown_timeout - grace, grace)
}

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Handler outcomes collected during one run
#[derive(Debug, Default)]
struct RunStats {
    acked: u64,
    rejected: u64,
    aborted: u64,
}

impl RunStats {
    fn record(&mut self, joined: std::result::Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Acked) => self.acked += 1,
            Ok(Outcome::Rejected) => self.rejected += 1,
            Err(e) => {
                if e.is_panic() {
                    error!(error = %e, "message handler panicked");
                }
                self.aborted += 1;
            }
        }
    }
}

/// Event worker bound to one subscription
pub struct Worker {
    config: Arc<WorkerConfig>,
    channel: Arc<dyn MessageChannel>,
    handler: Arc<EventHandler>,
    retry: RetryPolicy,
    span: Span,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    /// Create a worker.
    ///
    /// `span` is the logging context every handler runs in; callers usually
    /// pass one carrying the topic.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        channel: Arc<dyn MessageChannel>,
        span: Span,
    ) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let handler = Arc::new(EventHandler::new(Arc::clone(&config), store));
        let (state, _) = watch::channel(WorkerState::Starting);

        Ok(Self {
            config,
            channel,
            handler,
            retry: RetryPolicy::default(),
            span,
            state,
        })
    }

    /// Backoff used while the channel reports retryable failures
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Watch lifecycle transitions
    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Handle a single message outside the receive loop
    pub async fn handle(&self, message: Message) -> Outcome {
        let never = CancellationToken::new();
        self.handler
            .handle(message, &never)
            .instrument(self.span.clone())
            .await
    }

    /// Main worker loop
    ///
    /// Pulls and handles messages until `token` is cancelled (returns `Ok`)
    /// or the channel fails with a non-retryable error (returns `Err`).
    /// Retryable channel failures are retried with backoff for as long as
    /// they last. In both cases in-flight handlers are drained before
    /// returning, within `shutdown_timeout`.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        self.run_inner(token).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, token: CancellationToken) -> Result<()> {
        let topic = self.config.topic.as_str();
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let hard_stop = CancellationToken::new();
        let mut handlers: JoinSet<Outcome> = JoinSet::new();
        let mut stats = RunStats::default();
        let mut failures: u32 = 0;

        self.state.send_replace(WorkerState::Running);
        info!(
            topic = %topic,
            subscription = %self.channel.subscription(),
            max_in_flight = self.config.max_in_flight,
            "starting worker"
        );

        let result = loop {
            while let Some(joined) = handlers.try_join_next() {
                stats.record(joined);
            }

            // Pull only as many messages as there are free handler slots so
            // nothing sits unhandled while its ack deadline runs.
            let first = tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };
            let batch = self
                .config
                .max_messages
                .min(permits.available_permits() + 1);

            let received = tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                received = self.channel.receive(batch) => received,
            };
            let messages = match received {
                Ok(messages) => {
                    failures = 0;
                    messages
                }
                Err(e) if e.is_retryable() => {
                    drop(first);
                    let delay = self.retry.delay_for(failures);
                    failures = failures.saturating_add(1);
                    warn!(
                        topic = %topic,
                        subscription = %self.channel.subscription(),
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "receive failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(e) => break Err(WorkerError::Channel(e)),
            };
            if messages.is_empty() {
                continue;
            }
            debug!(topic = %topic, count = messages.len(), "dispatching messages");

            // Everything received is handled, even if shutdown started meanwhile.
            let mut first = Some(first);
            for message in messages {
                let permit = match first.take() {
                    Some(permit) => permit,
                    None => match Arc::clone(&permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let handler = Arc::clone(&self.handler);
                let stop = hard_stop.clone();
                handlers.spawn(
                    async move {
                        let outcome = handler.handle(message, &stop).await;
                        drop(permit);
                        outcome
                    }
                    .instrument(Span::current()),
                );
            }
        };

        self.state.send_replace(WorkerState::Draining);
        if !handlers.is_empty() {
            info!(
                topic = %topic,
                in_flight = handlers.len(),
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "draining in-flight messages"
            );
        }

        let (budget, grace) = drain_budget(self.config.shutdown_timeout);
        let drained = tokio::time::timeout(budget, drain(&mut handlers, &mut stats)).await;
        if drained.is_err() {
            warn!(
                topic = %topic,
                remaining = handlers.len(),
                "shutdown timeout reached, abandoning in-flight updates"
            );
            hard_stop.cancel();
            if tokio::time::timeout(grace, drain(&mut handlers, &mut stats))
                .await
                .is_err()
            {
                handlers.abort_all();
                drain(&mut handlers, &mut stats).await;
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        info!(
            topic = %topic,
            acked = stats.acked,
            rejected = stats.rejected,
            aborted = stats.aborted,
            "receive loop stopped"
        );

        result
    }
}

async fn drain(handlers: &mut JoinSet<Outcome>, stats: &mut RunStats) {
    while let Some(joined) = handlers.join_next().await {
        stats.record(joined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_budget_fits_shutdown_timeout() {
        assert_eq!(
            drain_budget(Duration::from_secs(60)),
            (Duration::from_secs(58), Duration::from_secs(2))
        );
        assert_eq!(
            drain_budget(Duration::from_secs(1)),
            (Duration::from_millis(500), Duration::from_millis(500))
        );
        assert_eq!(drain_budget(Duration::ZERO), (Duration::ZERO, Duration::ZERO));
    }
}
