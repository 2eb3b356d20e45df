//! The embedder-facing capability interface.
//!
//! An embedder implements only the hooks it cares about; every method has a
//! no-op default so a bare `DefaultCallbacks` (or `()`) is always valid.

use hubline_core::{ClientGuid, Envelope};

/// Lifecycle and traffic hooks a `Broker` invokes as it runs.
///
/// All methods run on the connection's own task, so a slow implementation
/// slows only that connection, never the rest of the server.
pub trait BrokerCallbacks: Send + Sync {
    /// Called for every envelope the processor has finished handling,
    /// after any reply has been sent.
    fn on_message_received(&self, _sender: ClientGuid, _envelope: &Envelope) {}

    /// Called once, when the accept loop stops.
    fn on_server_stopped(&self) {}

    /// Called when a TCP (or TLS) connection is accepted, before login.
    fn on_client_connected(&self, _client: ClientGuid) {}

    /// Called when a client completes login successfully.
    fn on_client_login(&self, _client: ClientGuid, _email: &str) {}

    /// Called when a client's connection is removed from the registry,
    /// whether by clean disconnect or heartbeat eviction.
    fn on_client_disconnected(&self, _client: ClientGuid) {}

    /// Called for diagnostic messages the broker wants to surface to an
    /// embedder-chosen sink, independent of the `tracing` event stream.
    fn on_log_message(&self, _message: &str) {}
}

/// A [`BrokerCallbacks`] implementation that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl BrokerCallbacks for NoopCallbacks {}
