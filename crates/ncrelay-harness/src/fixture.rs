//! Real server on a loopback port.
//!
//! [`TestServer`] builds a [`RelayConfig`] around a temporary model file and
//! starts the server on `127.0.0.1:0`. The returned [`RunningServer`] shuts
//! down on demand instead of waiting for a signal.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use ncrelay_core::{
    ConnectionRegistry, DrainOutcome, EngineBackend, EngineConfig, FrameSpec, SuppressionLevel,
};
use ncrelay_server::{EngineDispatch, RelayConfig, Server, ServerError};
use tempfile::NamedTempFile;
use tokio::{
    sync::oneshot,
    task::{JoinError, JoinHandle},
};

use crate::client::FrameClient;

/// Interval at which [`RunningServer::wait_for_active`] samples the registry.
const POLL: Duration = Duration::from_millis(5);

/// Builder for a loopback relay.
pub struct TestServer<B: EngineBackend> {
    backend: Arc<B>,
    config: RelayConfig,
    model: NamedTempFile,
}

impl<B: EngineBackend> TestServer<B> {
    /// Relay with default settings around `backend`.
    ///
    /// Drain checks run every 10 ms so shutdown tests stay fast.
    pub fn new(backend: B) -> io::Result<Self> {
        Self::with_backend(Arc::new(backend))
    }

    /// Like [`new`](Self::new) with a shared backend.
    pub fn with_backend(backend: Arc<B>) -> io::Result<Self> {
        let model = NamedTempFile::new()?;
        let mut config = RelayConfig::new("127.0.0.1:0", EngineConfig::new(model.path()));
        config.poll_interval = Duration::from_millis(10);
        Ok(Self { backend, config, model })
    }

    /// Cap concurrent sessions.
    #[must_use]
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.config.max_connections = limit;
        self
    }

    /// Grace period once shutdown is triggered.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Where engine calls run.
    #[must_use]
    pub fn dispatch(mut self, dispatch: EngineDispatch) -> Self {
        self.config.session.dispatch = dispatch;
        self
    }

    /// Frame geometry.
    #[must_use]
    pub fn frame_spec(mut self, spec: FrameSpec) -> Self {
        self.config.session.engine = self.config.session.engine.with_frame_spec(spec);
        self
    }

    /// Suppression level applied to every frame.
    #[must_use]
    pub fn suppression(mut self, level: SuppressionLevel) -> Self {
        self.config.session.suppression = level;
        self
    }

    /// Collect per-frame energy stats.
    #[must_use]
    pub fn stats(mut self, enabled: bool) -> Self {
        self.config.session.engine = self.config.session.engine.with_stats(enabled);
        self
    }

    /// Bind and start serving in a background task.
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let frame_bytes = self.config.session.engine.frame_spec().frame_bytes();
        let server = Server::bind(self.config, self.backend).await?;
        let addr = server.local_addr()?;
        let registry = server.registry();

        let (trigger, stop) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async move {
            let _ = stop.await;
        }));

        tracing::debug!("Test server listening on {}", addr);
        Ok(RunningServer {
            addr,
            frame_bytes,
            registry,
            trigger: Some(trigger),
            task,
            _model: self.model,
        })
    }
}

/// Handle to a relay running in the background.
pub struct RunningServer {
    addr: SocketAddr,
    frame_bytes: usize,
    registry: ConnectionRegistry,
    trigger: Option<oneshot::Sender<()>>,
    task: JoinHandle<DrainOutcome>,
    _model: NamedTempFile,
}

impl RunningServer {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bytes in one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// The server's session registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Open a client connection.
    pub async fn connect(&self) -> io::Result<FrameClient> {
        FrameClient::connect(self.addr, self.frame_bytes).await
    }

    /// Wait until exactly `active` sessions are open. Returns `false` if that
    /// does not happen within `within`.
    pub async fn wait_for_active(&self, active: usize, within: Duration) -> bool {
        let wait = async {
            while self.registry.active() != active {
                tokio::time::sleep(POLL).await;
            }
        };
        tokio::time::timeout(within, wait).await.is_ok()
    }

    /// Begin the drain, as a termination signal would.
    pub fn trigger_shutdown(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            let _ = trigger.send(());
        }
    }

    /// Trigger shutdown if needed and wait for the drain to finish.
    pub async fn shutdown(mut self) -> Result<DrainOutcome, JoinError> {
        self.trigger_shutdown();
        self.join().await
    }

    /// Wait for a drain already triggered to finish.
    pub async fn join(self) -> Result<DrainOutcome, JoinError> {
        self.task.await
    }
}
