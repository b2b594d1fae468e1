//! Graceful shutdown coordination.
//!
//! Components register a shutdown action (optionally with a timeout) and may
//! launch a startup task alongside it. [`GracefulHook::wait`] parks until the
//! external signal fires or the first startup task fails, then runs every
//! registered action last-in first-out.
//!
//! A bounded action runs on its own task raced against a timer. When the timer
//! wins the action is reported as timed out and left running: it is neither
//! cancelled nor awaited, so it can outlive `wait`. Whatever it holds is only
//! released when it finishes or the runtime shuts down.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::HookError;

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type HookAction = Box<dyn FnOnce() -> HookFuture + Send + 'static>;

struct ShutdownHook {
    action: HookAction,
    timeout: Option<Duration>,
}

impl ShutdownHook {
    async fn shut_down(self, hook: usize) -> Result<(), HookError> {
        let handle = tokio::spawn((self.action)());
        let Some(timeout) = self.timeout else {
            return handle.await.map_err(|_| HookError::Panicked { hook });
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HookError::Panicked { hook }),
            // Dropping the JoinHandle detaches the straggler.
            Err(_) => Err(HookError::Timeout { hook, timeout }),
        }
    }
}

/// Single-assignment slot for the first startup failure.
#[derive(Default)]
struct StartupLatch {
    error: OnceLock<anyhow::Error>,
    wake: Notify,
}

impl StartupLatch {
    fn trip(&self, err: anyhow::Error) -> Result<(), anyhow::Error> {
        self.error.set(err)?;
        self.wake.notify_one();
        Ok(())
    }

    fn is_tripped(&self) -> bool {
        self.error.get().is_some()
    }
}

/// What woke the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownCause {
    Signal,
    StartupFailed(String),
}

/// Outcome of a completed teardown.
#[derive(Debug)]
pub struct ShutdownReport {
    pub cause: ShutdownCause,
    /// Hook failures in the order they happened.
    pub failures: Vec<HookError>,
}

/// Registry of shutdown actions torn down in reverse registration order.
pub struct GracefulHook {
    signal: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    latch: Arc<StartupLatch>,
    hooks: Vec<ShutdownHook>,
}

impl GracefulHook {
    /// Create a coordinator woken by `signal`.
    pub fn new<S>(signal: S) -> Self
    where
        S: Future<Output = ()> + Send + 'static,
    {
        Self {
            signal: Box::pin(signal),
            latch: Arc::new(StartupLatch::default()),
            hooks: Vec::new(),
        }
    }

    /// Register a shutdown action.
    ///
    /// `None` (or a zero duration) awaits the action without a bound.
    pub fn register_shutdown<F, Fut>(&mut self, action: F, timeout: Option<Duration>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: HookAction = Box::new(move || Box::pin(action()) as HookFuture);
        self.hooks.push(ShutdownHook {
            action,
            timeout: timeout.filter(|timeout| !timeout.is_zero()),
        });
    }

    /// Register a shutdown action and launch `start` in the background.
    ///
    /// The first startup error across all launched tasks wakes [`wait`](Self::wait);
    /// later ones are dropped. Once an error is latched this is a no-op.
    pub fn register_shutdown_with_startup<S, E, F, Fut>(
        &mut self,
        start: S,
        shutdown: F,
        timeout: Option<Duration>,
    ) where
        S: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_fatal() {
            warn!("Startup error already latched, refusing to start component");
            return;
        }

        self.register_shutdown(shutdown, timeout);

        let latch = Arc::clone(&self.latch);
        tokio::spawn(async move {
            if let Err(e) = start.await {
                if let Err(dropped) = latch.trip(e.into()) {
                    debug!(error = %dropped, "Dropping later startup error");
                }
            }
        });
    }

    /// Whether a startup task has already failed.
    pub fn is_fatal(&self) -> bool {
        self.latch.is_tripped()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Wait for the signal or the first startup failure, then run every hook
    /// in reverse order. Hook failures are logged and never stop the teardown.
    pub async fn wait(self) -> ShutdownReport {
        let GracefulHook {
            signal,
            latch,
            hooks,
        } = self;

        let cause = tokio::select! {
            _ = signal => {
                info!("Shutdown signal received");
                ShutdownCause::Signal
            }
            _ = latch.wake.notified() => {
                let message = latch
                    .error
                    .get()
                    .map(|e| format!("{:#}", e))
                    .unwrap_or_default();
                error!(error = %message, "Graceful startup error");
                ShutdownCause::StartupFailed(message)
            }
        };

        let total = hooks.len();
        let mut failures = Vec::new();
        for (index, hook) in hooks.into_iter().enumerate().rev() {
            if let Err(e) = hook.shut_down(index).await {
                error!(hook = index, "{}", e);
                failures.push(e);
            }
        }

        info!(hooks = total, failed = failures.len(), "Graceful shutdown complete");
        ShutdownReport { cause, failures }
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
