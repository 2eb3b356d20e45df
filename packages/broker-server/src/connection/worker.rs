//! Owns one client connection end to end: accept, login gate, read/write
//! loop, heartbeat supervision, and eviction.

use std::sync::Arc;
use std::time::Duration;

use hubline_core::{ClientGuid, Command, Envelope};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::server::BrokerState;
use crate::shutdown::InFlightGuard;
use crate::transport::FramedTransport;

use super::heartbeat::HeartbeatSupervisor;

enum DisconnectReason {
    PeerClosed,
    TransportError,
    HeartbeatTimeout,
    ServerShutdown,
}

/// Drives one accepted connection until it disconnects or the server shuts down.
pub struct ConnectionWorker;

impl ConnectionWorker {
    /// Runs the connection to completion, registering and then tearing down
    /// all per-client state. `_drain_guard` keeps the shutdown controller's
    /// in-flight count accurate for as long as this function is executing.
    pub async fn serve(
        mut transport: FramedTransport,
        state: Arc<BrokerState>,
        mut shutdown_rx: watch::Receiver<bool>,
        _drain_guard: InFlightGuard,
    ) {
        let addr = transport.peer_addr();
        let mut guid = ClientGuid::new();
        let (tx, mut outbox_rx) = mpsc::channel(state.config.outbound_channel_capacity);
        state.clients.add_client(guid, addr, tx.clone());
        state.callbacks.on_client_connected(guid);
        info!(%guid, %addr, "client connected");

        let supervisor = HeartbeatSupervisor::new(
            state.config.heartbeat_interval,
            state.config.max_heartbeat_failures,
        );
        // A zero interval means heartbeats are configured off; `tokio::time::interval`
        // panics on a zero duration, so build it with a harmless placeholder and never
        // poll the branch that ticks it.
        let heartbeat_enabled = !supervisor.interval().is_zero();
        let mut heartbeat_tick = tokio::time::interval(if heartbeat_enabled {
            supervisor.interval()
        } else {
            Duration::from_secs(3600)
        });
        heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut sweep_tick =
            tokio::time::interval(state.config.sync_timeout.max(Duration::from_secs(1)));

        let reason = loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    break DisconnectReason::ServerShutdown;
                }

                read_result = transport.read_envelope() => {
                    match read_result {
                        Ok(Some(envelope)) => {
                            guid = Self::handle_inbound(&state, guid, &addr, &tx, envelope, &mut transport, &supervisor).await;
                        }
                        Ok(None) => break DisconnectReason::PeerClosed,
                        Err(err) => {
                            warn!(%guid, error = %err, "transport read failed");
                            break DisconnectReason::TransportError;
                        }
                    }
                }

                Some(outgoing) = outbox_rx.recv() => {
                    if let Err(err) = transport.write_envelope(&outgoing).await {
                        warn!(%guid, error = %err, "transport write failed");
                        break DisconnectReason::TransportError;
                    }
                }

                _ = heartbeat_tick.tick(), if heartbeat_enabled => {
                    let probe = Self::heartbeat_probe();
                    match transport.write_envelope(&probe).await {
                        Ok(()) => supervisor.record_success(),
                        Err(err) => {
                            warn!(%guid, error = %err, "heartbeat write failed");
                            if supervisor.record_failure() {
                                break DisconnectReason::HeartbeatTimeout;
                            }
                        }
                    }
                }

                _ = sweep_tick.tick() => {
                    if let Some(entry) = state.clients.get_client(guid) {
                        entry.correlator.sweep();
                    }
                }
            }
        };

        Self::teardown(&state, guid, reason).await;
    }

    /// Builds a server-origin heartbeat probe. Writing this to the peer and
    /// observing whether the write succeeds is how a peer that stopped
    /// reading (but never closed its socket) gets caught; a read-only probe
    /// of the transport's buffered state can't see that on its own.
    fn heartbeat_probe() -> Envelope {
        let mut envelope = Envelope::new();
        envelope.sender_guid = Some(ClientGuid::server());
        envelope.command = Some(Command::HeartbeatRequest);
        envelope
    }

    /// Processes one inbound envelope, returning the `ClientGuid` this
    /// connection should be known as from now on (normally unchanged; it
    /// changes only when login hands this connection over to an existing
    /// identity reconnecting from a new address).
    async fn handle_inbound(
        state: &Arc<BrokerState>,
        mut guid: ClientGuid,
        addr: &std::net::SocketAddr,
        tx: &mpsc::Sender<Envelope>,
        envelope: Envelope,
        transport: &mut FramedTransport,
        supervisor: &HeartbeatSupervisor,
    ) -> ClientGuid {
        if envelope.command == Some(Command::HeartbeatRequest) {
            supervisor.record_success();
        }

        if envelope.command == Some(Command::Login) {
            guid = Self::reconcile_identity(state, guid, *addr, tx.clone(), &envelope);
        }

        let outcome = state.processor.process(guid, envelope.clone());
        state.callbacks.on_message_received(guid, &envelope.redact());

        if let Some(reply) = outcome.reply {
            if let Err(err) = transport.write_envelope(&reply).await {
                warn!(%guid, error = %err, "failed writing reply");
            }
        }

        if envelope.command == Some(Command::Login) {
            if let Some(entry) = state.clients.get_client(guid) {
                if let Some(email) = entry.email() {
                    state.callbacks.on_client_login(guid, &email);
                }
            }
        }

        for effect in outcome.post_reply {
            effect.apply(&state.events);
        }

        guid
    }

    /// If a login names the email of an already-connected client (identified
    /// under a different `ClientGuid`, typically its prior connection from a
    /// different address), hand this connection's transport over to that
    /// existing identity instead of registering a second one.
    fn reconcile_identity(
        state: &Arc<BrokerState>,
        guid: ClientGuid,
        addr: std::net::SocketAddr,
        tx: mpsc::Sender<Envelope>,
        envelope: &Envelope,
    ) -> ClientGuid {
        let Some(email) = envelope.email.as_deref().filter(|e| !e.is_empty()) else {
            return guid;
        };

        let existing = state
            .clients
            .all_clients()
            .into_iter()
            .find(|c| c.guid != guid && c.email().as_deref() == Some(email));

        let Some(existing) = existing else {
            return guid;
        };

        state.clients.remove_client(guid);
        state.clients.update_client(existing.guid, addr, tx);
        existing.guid
    }

    async fn teardown(state: &Arc<BrokerState>, guid: ClientGuid, reason: DisconnectReason) {
        let was_logged_in = state
            .clients
            .get_client(guid)
            .map(|c| c.is_logged_in())
            .unwrap_or(false);

        state.clients.remove_client(guid);
        let left_channels = state.channels.remove_client_everywhere(guid);
        for channel in left_channels {
            state.events.publish_channel_membership(channel.guid, guid, false);
        }
        if was_logged_in {
            state.events.publish_server_membership(guid, false);
        }
        state.callbacks.on_client_disconnected(guid);

        match reason {
            DisconnectReason::PeerClosed => info!(%guid, "client disconnected"),
            DisconnectReason::TransportError => warn!(%guid, "connection dropped after transport error"),
            DisconnectReason::HeartbeatTimeout => warn!(%guid, "client evicted after missed heartbeats"),
            DisconnectReason::ServerShutdown => info!(%guid, "connection closed for server shutdown"),
        }
    }
}
