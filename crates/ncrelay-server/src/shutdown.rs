//! Termination signals and the drain supervisor.
//!
//! On the first SIGINT or SIGTERM the server stops accepting connections and
//! polls the registry until it is empty or the grace period runs out. Further
//! signals during the drain are absorbed; handlers stay installed for the
//! life of the process so a second signal never falls back to the default
//! disposition.

use std::{io, time::Duration};

use ncrelay_core::{ConnectionRegistry, DrainDecision, DrainOutcome, DrainPlan, Environment};

use crate::listener::ListenerHandle;

/// Process termination signals.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Install handlers for SIGINT and SIGTERM.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => tracing::info!("Received SIGINT"),
                _ = self.terminate.recv() => tracing::info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl-C");
        }
    }
}

/// Drives the drain once shutdown has been requested.
pub struct ShutdownCoordinator<E: Environment> {
    env: E,
    registry: ConnectionRegistry,
    listener: ListenerHandle,
    timeout: Duration,
    poll_interval: Duration,
}

impl<E: Environment> ShutdownCoordinator<E> {
    /// Create a coordinator for `registry`, stopping `listener` first.
    pub fn new(
        env: E,
        registry: ConnectionRegistry,
        listener: ListenerHandle,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self { env, registry, listener, timeout, poll_interval }
    }

    /// Stop accepting and wait for sessions to finish, at most `timeout`.
    pub async fn drain(&self) -> DrainOutcome {
        self.listener.close();

        let plan = DrainPlan::new(self.env.now(), self.timeout);
        tracing::info!(
            "Shutting down: waiting up to {:?} for {} active sessions",
            self.timeout,
            self.registry.active()
        );

        let outcome = loop {
            match plan.check(self.env.now(), self.registry.active()) {
                DrainDecision::Stop(outcome) => break outcome,
                DrainDecision::Wait => self.env.sleep(self.poll_interval).await,
            }
        };

        match outcome {
            DrainOutcome::Graceful => tracing::info!("All sessions closed, shutdown complete"),
            DrainOutcome::Forced { abandoned } => tracing::warn!(
                "Shutdown timeout reached, abandoning {} active sessions",
                abandoned
            ),
        }

        outcome
    }
}
