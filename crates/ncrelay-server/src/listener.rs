//! TCP accept loop with admission control.
//!
//! Each accepted stream is admitted against the registry before a session is
//! spawned for it. Streams over the limit are dropped straight away, which
//! closes them without reading a byte. Closing the [`ListenerHandle`] ends the
//! loop and releases the socket, so later connection attempts are refused by
//! the operating system.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use ncrelay_core::{ConnectionRegistry, EngineBackend};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
};

use crate::{config::SessionSettings, session};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Stops the accept loop.
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    closed: Arc<watch::Sender<bool>>,
}

impl ListenerHandle {
    pub(crate) fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self { closed: Arc::new(closed) }
    }

    /// Stop accepting. Returns `true` the first time only.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| !std::mem::replace(closed, true))
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

/// Bound listening socket plus everything needed to start sessions.
pub struct Listener<B: EngineBackend> {
    socket: TcpListener,
    registry: ConnectionRegistry,
    max_connections: usize,
    backend: Arc<B>,
    settings: Arc<SessionSettings>,
    handle: ListenerHandle,
}

impl<B: EngineBackend> Listener<B> {
    /// Bind to `address`.
    pub async fn bind(
        address: &str,
        registry: ConnectionRegistry,
        max_connections: usize,
        backend: Arc<B>,
        settings: Arc<SessionSettings>,
    ) -> io::Result<Self> {
        let socket = TcpListener::bind(address).await?;
        let handle = ListenerHandle::new();
        Ok(Self { socket, registry, max_connections, backend, settings, handle })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle that stops this listener.
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    /// Accept until the handle is closed, then drop the socket.
    pub async fn run(self) {
        let mut closed = self.handle.subscribe();

        loop {
            tokio::select! {
                biased;
                // The borrowed value must not outlive this arm
                () = async {
                    let _ = closed.wait_for(|closed| *closed).await;
                } => break,
                accepted = self.socket.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    },
                },
            }
        }

        tracing::info!("Listener closed, no longer accepting connections");
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = match self.registry.try_admit(self.max_connections) {
            Ok(guard) => guard,
            Err(denied) => {
                tracing::warn!(
                    peer = %peer,
                    active = denied.active,
                    limit = denied.limit,
                    total = self.registry.total(),
                    "Rejected connection: limit reached"
                );
                return;
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        tracing::info!(
            peer = %peer,
            active = self.registry.active(),
            total = self.registry.total(),
            "Accepted connection"
        );

        tokio::spawn(session::run(
            stream,
            guard,
            Arc::clone(&self.backend),
            Arc::clone(&self.settings),
        ));
    }
}

#[cfg(test)]
mod tests {
    use ncrelay_core::{BypassBackend, EngineConfig};

    use super::*;

    #[test]
    fn handle_closes_once() {
        let handle = ListenerHandle::new();
        assert!(!handle.is_closed());

        assert!(handle.close());
        assert!(handle.is_closed());
        assert!(!handle.close());
        assert!(handle.clone().is_closed());
    }

    #[tokio::test]
    async fn subscribers_see_close() {
        let handle = ListenerHandle::new();
        let mut rx = handle.subscribe();

        let waiter = tokio::spawn(async move { rx.wait_for(|closed| *closed).await.is_ok() });
        handle.close();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn run_spawns_and_stops_on_close() {
        let listener = Listener::bind(
            "127.0.0.1:0",
            ConnectionRegistry::new(),
            1,
            Arc::new(BypassBackend::new()),
            Arc::new(SessionSettings::new(EngineConfig::new("model.kef"))),
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = listener.handle();

        // Spawned onto a multi-threaded pool by the server
        let accept_loop = tokio::spawn(listener.run());
        assert!(handle.close());

        tokio::time::timeout(Duration::from_secs(5), accept_loop).await.unwrap().unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
