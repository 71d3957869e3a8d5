//! Noise-cancellation relay server.
//!
//! Accepts TCP connections, reads fixed-size audio frames, runs each through
//! a per-connection engine instance, and writes the result back in strict
//! request/response cadence.
//!
//! # Architecture
//!
//! This crate wraps [`ncrelay_core`]'s pure pieces with Tokio I/O. The
//! registry, session state machine, and drain plan live in the core crate;
//! here they are driven by real sockets, timers, and signals.
//!
//! # Components
//!
//! - [`Server`]: binds the socket, runs the accept loop, drains on shutdown
//! - [`ExecutionPool`]: runtime with async workers and a bounded engine pool
//! - [`ListenerHandle`]: stops admitting new connections
//! - [`ShutdownCoordinator`]: deadline-bounded drain
//! - [`TerminationSignals`]: SIGINT/SIGTERM as a shutdown trigger
//! - [`SystemEnv`]: production clock

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod listener;
mod pool;
mod session;
mod shutdown;
mod system_env;

use std::{future::Future, net::SocketAddr, sync::Arc};

pub use config::{
    DEFAULT_ENGINE_THREADS, DEFAULT_MAX_CONNECTIONS, DEFAULT_STOP_GRACE, EngineDispatch,
    PoolConfig, RelayConfig, SessionSettings,
};
pub use error::ServerError;
pub use listener::{Listener, ListenerHandle};
use ncrelay_core::{ConnectionRegistry, DrainOutcome, EngineBackend};
pub use pool::ExecutionPool;
pub use shutdown::{ShutdownCoordinator, TerminationSignals};
pub use system_env::SystemEnv;

/// Production relay server.
pub struct Server<B: EngineBackend> {
    listener: Listener<B>,
    registry: ConnectionRegistry,
    config: RelayConfig,
}

impl<B: EngineBackend> Server<B> {
    /// Validate `config` and bind the listening socket.
    ///
    /// `backend` must already be initialized.
    pub async fn bind(config: RelayConfig, backend: Arc<B>) -> Result<Self, ServerError> {
        config.validate()?;

        let registry = ConnectionRegistry::new();
        let listener = Listener::bind(
            &config.bind_address,
            registry.clone(),
            config.max_connections,
            backend,
            Arc::new(config.session.clone()),
        )
        .await
        .map_err(|e| {
            ServerError::Transport(format!("failed to bind {}: {}", config.bind_address, e))
        })?;

        Ok(Self { listener, registry, config })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Registry tracking this server's sessions.
    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    /// Serve until `shutdown` resolves, then drain.
    ///
    /// Sessions still open when the drain gives up keep running until the
    /// runtime is dropped.
    pub async fn run_until<F>(self, shutdown: F) -> DrainOutcome
    where
        F: Future<Output = ()>,
    {
        let Self { listener, registry, config } = self;
        let handle = listener.handle();

        tracing::info!(
            "Server accepting up to {} connections ({})",
            config.max_connections,
            config.session.engine.frame_spec()
        );
        let accept_loop = tokio::spawn(listener.run());

        shutdown.await;

        let coordinator = ShutdownCoordinator::new(
            SystemEnv::new(),
            registry,
            handle,
            config.shutdown_timeout,
            config.poll_interval,
        );
        let outcome = coordinator.drain().await;

        if let Err(e) = accept_loop.await {
            tracing::error!("Accept loop failed: {}", e);
        }

        outcome
    }

    /// Serve until SIGINT or SIGTERM, then drain.
    pub async fn run(self) -> Result<DrainOutcome, ServerError> {
        let mut signals = TerminationSignals::install()
            .map_err(|e| ServerError::Internal(format!("failed to install signal handlers: {e}")))?;

        Ok(self.run_until(async move { signals.recv().await }).await)
    }
}
