//! The broker's top-level lifecycle: bind, accept, serve, drain.
//!
//! Follows a deferred-startup split — [`Broker::new`] wires dependencies
//! without touching the network, [`Broker::start`] binds the listener and
//! reports the bound port, and [`Broker::serve`] runs the accept loop to
//! completion. Splitting `start` from `serve` lets an embedder learn the
//! OS-assigned port (when `port: 0` is configured) before the accept loop
//! starts blocking.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::callbacks::{BrokerCallbacks, NoopCallbacks};
use crate::config::BrokerConfig;
use crate::connection::ConnectionWorker;
use crate::events::EventPublisher;
use crate::processor::MessageProcessor;
use crate::registry::{ChannelRegistry, ClientRegistry};
use crate::shutdown::ShutdownController;
use crate::transport::{load_tls_acceptor, FramedTransport, PeerStream};

/// Shared, immutable-after-construction state every connection worker reads from.
pub struct BrokerState {
    pub config: Arc<BrokerConfig>,
    pub clients: Arc<ClientRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub processor: Arc<MessageProcessor>,
    pub events: Arc<EventPublisher>,
    pub callbacks: Arc<dyn BrokerCallbacks>,
}

/// A running (or not-yet-started) broker instance.
pub struct Broker {
    state: Arc<BrokerState>,
    shutdown: ShutdownController,
    listener: Option<TcpListener>,
    tls_acceptor: Option<TlsAcceptor>,
}

impl Broker {
    /// Builds a broker with no-op embedder callbacks.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_callbacks(config, Arc::new(NoopCallbacks))
    }

    /// Builds a broker that invokes `callbacks` for connection and traffic events.
    #[must_use]
    pub fn with_callbacks(config: BrokerConfig, callbacks: Arc<dyn BrokerCallbacks>) -> Self {
        let config = Arc::new(config);
        let clients = Arc::new(ClientRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let processor = Arc::new(MessageProcessor::new(
            Arc::clone(&clients),
            Arc::clone(&channels),
            Arc::clone(&config),
        ));
        let events = Arc::new(EventPublisher::new(
            Arc::clone(&clients),
            Arc::clone(&channels),
            Arc::clone(&config),
        ));
        let state = Arc::new(BrokerState {
            config,
            clients,
            channels,
            processor,
            events,
            callbacks,
        });
        Self {
            state,
            shutdown: ShutdownController::new(),
            listener: None,
            tls_acceptor: None,
        }
    }

    /// A cloneable handle for triggering shutdown from another task (e.g. a
    /// signal handler) while [`serve`](Self::serve) is running.
    #[must_use]
    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Binds the listener (and, if configured, the TLS acceptor) and reports
    /// the bound port. Must be called before [`serve`](Self::serve).
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind, or TLS certificate
    /// material cannot be loaded.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        if let Some(tls) = &self.state.config.tls {
            self.tls_acceptor = Some(load_tls_acceptor(tls)?);
        }

        let listener = TcpListener::bind((self.state.config.host.as_str(), self.state.config.port))
            .await
            .with_context(|| {
                format!(
                    "binding {}:{}",
                    self.state.config.host, self.state.config.port
                )
            })?;
        let port = listener.local_addr()?.port();
        self.listener = Some(listener);
        self.shutdown.set_ready();
        info!(%port, tls = self.tls_acceptor.is_some(), "broker listening");
        Ok(port)
    }

    /// Runs the accept loop until shutdown is triggered, then drains
    /// in-flight connections before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` was never called.
    pub async fn serve(mut self) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .context("Broker::start must be called before Broker::serve")?;
        let mut shutdown_rx = self.shutdown.shutdown_receiver();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr, shutdown_rx.clone()),
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
            }
        }

        info!("draining in-flight connections");
        if !self.shutdown.wait_for_drain(self.state.config.drain_timeout).await {
            warn!("shutdown drain timed out with connections still in flight");
        }
        for entry in self.state.clients.drain_all() {
            let _ = entry;
        }
        self.state.callbacks.on_server_stopped();
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        addr: std::net::SocketAddr,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let state = Arc::clone(&self.state);
        let guard = self.shutdown.in_flight_guard();
        let tls_acceptor = self.tls_acceptor.clone();

        tokio::spawn(async move {
            let peer_stream = match tls_acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => PeerStream::Tls(Box::new(tls_stream)),
                    Err(err) => {
                        warn!(%addr, error = %err, "TLS handshake failed");
                        return;
                    }
                },
                None => PeerStream::Plain(stream),
            };

            let transport = match FramedTransport::new(peer_stream) {
                Ok(transport) => transport,
                Err(err) => {
                    warn!(%addr, error = %err, "failed to frame accepted connection");
                    return;
                }
            };

            ConnectionWorker::serve(transport, state, shutdown_rx, guard).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubline_core::{ClientGuid, Command, Envelope};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn connect_and_frame(
        port: u16,
    ) -> (tokio::net::TcpStream, std::net::SocketAddr) {
        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let addr = stream.local_addr().unwrap();
        (stream, addr)
    }

    fn write_frame(bytes: &[u8]) -> Vec<u8> {
        let mut out = (bytes.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(bytes);
        out
    }

    #[tokio::test]
    async fn accepts_a_connection_and_echoes_a_command() {
        let config = BrokerConfig { host: "127.0.0.1".to_string(), port: 0, ..BrokerConfig::default() };
        let mut broker = Broker::new(config);
        let port = broker.start().await.unwrap();
        let handle = broker.shutdown_controller();
        let server_task = tokio::spawn(broker.serve());

        let (mut stream, _addr) = connect_and_frame(port).await;

        let mut envelope = Envelope::new();
        envelope.command = Some(Command::Echo);
        envelope.sender_guid = Some(ClientGuid::new());
        let payload = serde_json::to_vec(&envelope).unwrap();
        stream.write_all(&write_frame(&payload)).await.unwrap();

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        let reply: Envelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply.success, Some(true));

        drop(stream);
        handle.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(2), server_task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn start_reports_os_assigned_port() {
        let config = BrokerConfig { host: "127.0.0.1".to_string(), port: 0, ..BrokerConfig::default() };
        let mut broker = Broker::new(config);
        let port = broker.start().await.unwrap();
        assert!(port > 0);
    }
}
