//! Shutdown signalling

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cloneable handle that requests a graceful shutdown.
///
/// Requesting shutdown is idempotent; once requested it stays requested.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by the receive loop
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Setup signal handlers for graceful shutdown
///
/// The handlers are installed before this returns, so a signal arriving
/// while the caller is still starting up is not fatal. The first of SIGHUP,
/// SIGINT, SIGTERM or SIGQUIT (Ctrl+C elsewhere) requests shutdown. Later
/// signals are absorbed by the installed handlers.
pub fn setup_signal_handler(shutdown: ShutdownHandle) -> std::io::Result<JoinHandle<()>> {
    let mut signals = Signals::register()?;

    Ok(tokio::spawn(async move {
        let token = shutdown.token();
        tokio::select! {
            _ = token.cancelled() => {}
            received = signals.recv() => match received {
                Ok(name) => {
                    info!(signal = name, "Received signal, initiating shutdown...");
                    shutdown.shutdown();
                }
                Err(e) => {
                    error!("Failed to listen for shutdown signals: {}", e);
                }
            },
        }
    }))
}

#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> std::io::Result<&'static str> {
        let name = tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        };
        Ok(name)
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_idempotent() {
        let handle = ShutdownHandle::new();
        let token = handle.token();
        assert!(!handle.is_shutdown());

        handle.shutdown();
        handle.clone().shutdown();

        assert!(handle.is_shutdown());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_watcher_exits_on_manual_shutdown() {
        let handle = ShutdownHandle::new();
        let watcher = tokio_test::assert_ok!(setup_signal_handler(handle.clone()));

        handle.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(1), watcher)
            .await
            .expect("watcher should stop")
            .expect("watcher should not panic");
    }

    #[cfg(unix)]
    fn send_signal(name: &str) {
        let status = std::process::Command::new("kill")
            .arg(format!("-{name}"))
            .arg(std::process::id().to_string())
            .status()
            .expect("kill should run");
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hangup_requests_shutdown_once() {
        let handle = ShutdownHandle::new();
        let watcher = tokio_test::assert_ok!(setup_signal_handler(handle.clone()));
        tokio::task::yield_now().await;

        send_signal("HUP");
        tokio::time::timeout(std::time::Duration::from_secs(5), watcher)
            .await
            .expect("watcher should stop on SIGHUP")
            .expect("watcher should not panic");
        assert!(handle.is_shutdown());

        // Handlers stay installed after the watcher exits.
        send_signal("TERM");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(handle.is_shutdown());
    }
}
