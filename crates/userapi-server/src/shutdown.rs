//! Shutdown coordination.
//!
//! [`ShutdownSignal`] tells the accept loop and every connection task that
//! draining has begun. [`ConnectionTracker`] counts live connections so the
//! drain can wait for them. [`OsSignals`] turns SIGHUP, SIGINT and SIGTERM
//! into a future that any trigger-driven run mode can await.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// One-way flag shared by every task that must react to shutdown.
///
/// Triggering is idempotent and every clone observes it.
///
/// ```rust
/// use userapi_server::ShutdownSignal;
///
/// let signal = ShutdownSignal::new();
/// let other = signal.clone();
/// assert!(signal.trigger());
/// assert!(!other.trigger());
/// assert!(other.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Triggers shutdown. Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        self.sender.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    /// Returns `true` once triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes when the signal is triggered, immediately if it already was.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            // The sender lives as long as any clone of the signal; a closed
            // channel can only mean every clone is gone.
            let _ = receiver.wait_for(|triggered| *triggered).await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts live connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Dropping the guard unregisters it.
    #[must_use]
    pub fn acquire(&self) -> ConnectionGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Completes once no connection is live.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a guard dropped in between still wakes us.
            notified.as_mut().enable();

            if self.active_connections() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Registered OS termination signals.
///
/// Registration happens up front so a failure surfaces before serving
/// starts, not when the first signal arrives.
#[derive(Debug)]
pub struct OsSignals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Installs handlers for SIGHUP, SIGINT and SIGTERM (Ctrl-C elsewhere).
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a handler cannot be installed.
    pub fn register() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            Ok(Self {
                hangup: signal(SignalKind::hangup())?,
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Completes on the first termination signal.
    pub async fn recv(mut self) {
        #[cfg(unix)]
        {
            let name = tokio::select! {
                _ = self.hangup.recv() => "SIGHUP",
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            };
            tracing::info!(signal = name, "Received signal, initiating graceful shutdown");
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to wait for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_starts_untriggered() {
        assert!(!ShutdownSignal::new().is_shutdown());
    }

    #[test]
    fn test_trigger_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_recv_completes_when_triggered() {
        let signal = ShutdownSignal::new();
        let waiter = signal.recv();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("recv should complete");
    }

    #[tokio::test]
    async fn test_recv_after_trigger_is_immediate() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        tokio::time::timeout(Duration::from_millis(10), signal.recv())
            .await
            .expect("recv should complete immediately");
    }

    #[tokio::test]
    async fn test_recv_pending_until_triggered() {
        let signal = ShutdownSignal::new();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.recv()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = ConnectionTracker::new();
        let a = tracker.acquire();
        let b = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(a);
        assert_eq!(tracker.active_connections(), 1);
        drop(b);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_without_connections() {
        let tracker = ConnectionTracker::new();
        tokio::time::timeout(Duration::from_millis(10), tracker.wait_idle())
            .await
            .expect("should be idle");
    }

    #[tokio::test]
    async fn test_wait_idle_after_last_guard() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.acquire();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(guard);
        });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait_idle())
            .await
            .expect("should become idle");
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_while_active() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.acquire();

        let result = tokio::time::timeout(Duration::from_millis(20), tracker.wait_idle()).await;
        assert!(result.is_err());
    }
}
