//! Cache Control Worker CLI
//!
//! Listens on a Pub/Sub subscription for bucket notifications and sets the
//! configured Cache-Control directive on each announced object.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use cache_control_worker::gcp::{GcsClient, PubSubClient};
use cache_control_worker::worker::{setup_signal_handler, ShutdownHandle, Worker, WorkerConfig};
use clap::{Parser, ValueEnum};
use tracing::{error, info, info_span};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cache-control-worker")]
#[command(about = "Set Cache-Control on storage objects announced via Pub/Sub")]
#[command(version)]
struct Cli {
    /// Pub/Sub subscription to listen to bucket events on
    #[arg(long, env = "CACHE_WORKER_TOPIC")]
    topic: Option<String>,

    /// Cache-Control string to set
    #[arg(long, env = "CACHE_WORKER_CACHE_CONTROL")]
    cache_control: Option<String>,

    /// Google Cloud project ID
    #[arg(long, env = "CACHE_WORKER_PROJECT_ID")]
    project_id: Option<String>,

    /// How long in-flight messages may take to finish on shutdown (e.g. 30s, 1m)
    #[arg(
        long,
        env = "CACHE_WORKER_SHUTDOWN_TIMEOUT",
        default_value = "1m",
        value_parser = humantime::parse_duration
    )]
    shutdown_timeout: Duration,

    /// Maximum number of messages handled concurrently
    #[arg(long, env = "CACHE_WORKER_MAX_IN_FLIGHT", default_value = "10")]
    max_in_flight: usize,

    /// Maximum number of messages requested per pull
    #[arg(long, env = "CACHE_WORKER_MAX_MESSAGES", default_value = "100")]
    max_messages: usize,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

fn init_tracing(format: LogFormat, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow!("cannot install log subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose)?;

    let config = WorkerConfig::builder()
        .topic(cli.topic.unwrap_or_default())
        .cache_control(cli.cache_control.unwrap_or_default())
        .project_id(cli.project_id.unwrap_or_default())
        .shutdown_timeout(cli.shutdown_timeout)
        .max_in_flight(cli.max_in_flight)
        .max_messages(cli.max_messages)
        .build();

    // Refuse to start before touching any backend
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return Err(e.into());
    }
    let topic = config.topic.clone();

    // Install signal handlers before building backend clients
    let shutdown = ShutdownHandle::new();
    let watcher = setup_signal_handler(shutdown.clone()).inspect_err(|e| {
        error!(topic = %topic, error = %e, "cannot install signal handlers");
    })?;

    let store = GcsClient::from_env().await.inspect_err(|e| {
        error!(topic = %topic, error = %e, "cannot create storage client");
    })?;
    let channel = PubSubClient::from_env(&config.project_id, &config.topic)
        .await
        .inspect_err(|e| {
            error!(topic = %topic, error = %e, "cannot create pub/sub client");
        })?;

    let worker = Worker::new(
        config,
        Arc::new(store),
        Arc::new(channel),
        info_span!("worker", topic = %topic),
    )?;

    let result = worker.run(shutdown.token()).await;
    watcher.abort();

    if let Err(e) = result {
        error!(topic = %topic, error = %e, "cannot consume message");
        return Err(e.into());
    }

    info!(topic = %topic, "worker stopped: ok");
    Ok(())
}
