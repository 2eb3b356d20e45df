//! Publishes system lifecycle events to the clients that should see them.

use std::sync::Arc;

use hubline_core::{ClientGuid, Envelope, EventEnvelope, EventType};
use tracing::warn;

use crate::config::BrokerConfig;
use crate::registry::{ChannelRegistry, ClientRegistry};

/// Builds and fans out `ClientJoined*` / `ClientLeft*` / `ChannelDeleted` events.
///
/// Every send here is independently scheduled: one slow or closed recipient
/// never blocks delivery to the others, because each is a non-blocking
/// `try_send` against that recipient's own outbound channel.
pub struct EventPublisher {
    clients: Arc<ClientRegistry>,
    channels: Arc<ChannelRegistry>,
    config: Arc<BrokerConfig>,
}

impl EventPublisher {
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        channels: Arc<ChannelRegistry>,
        config: Arc<BrokerConfig>,
    ) -> Self {
        Self { clients, channels, config }
    }

    fn build(event_type: EventType, subject: ClientGuid) -> Option<Envelope> {
        let event = EventEnvelope::new(event_type, subject);
        match event.to_payload() {
            Ok(data) => {
                let mut envelope = Envelope::new();
                envelope.sender_guid = Some(ClientGuid::server());
                envelope.data = Some(data);
                Some(envelope)
            }
            Err(err) => {
                warn!(error = %err, "failed to encode system event payload");
                None
            }
        }
    }

    fn broadcast_to(
        &self,
        envelope: &Envelope,
        exclude: ClientGuid,
        recipients: impl Iterator<Item = ClientGuid>,
    ) {
        for recipient in recipients {
            if recipient == exclude {
                continue;
            }
            if let Some(client) = self.clients.get_client(recipient) {
                let mut addressed = envelope.clone();
                addressed.recipient_guid = Some(recipient);
                let _ = client.try_send(addressed);
            }
        }
    }

    /// Announces a client joining or leaving the server to every other connected client.
    pub fn publish_server_membership(&self, subject: ClientGuid, joined: bool) {
        if !self.config.server_join_events {
            return;
        }
        let event_type = if joined {
            EventType::ClientJoinedServer
        } else {
            EventType::ClientLeftServer
        };
        let Some(envelope) = Self::build(event_type, subject) else {
            return;
        };
        let recipients: Vec<ClientGuid> =
            self.clients.all_clients().iter().map(|c| c.guid).collect();
        self.broadcast_to(&envelope, subject, recipients.into_iter());
    }

    /// Announces a client joining or leaving a channel to its other subscribers.
    pub fn publish_channel_membership(
        &self,
        channel: hubline_core::ChannelGuid,
        subject: ClientGuid,
        joined: bool,
    ) {
        if !self.config.channel_events {
            return;
        }
        let event_type = if joined {
            EventType::ClientJoinedChannel
        } else {
            EventType::ClientLeftChannel
        };
        let Some(mut envelope) = Self::build(event_type, subject) else {
            return;
        };
        envelope.channel_guid = Some(channel);

        let Some(entry) = self.channels.get_by_guid(channel) else {
            return;
        };
        self.broadcast_to(&envelope, subject, entry.subscribers().into_iter());
    }

    /// Announces that a channel's owner deleted it, to everyone who was
    /// subscribed. Unlike the other membership events, this one is not
    /// gated by `channel_events`: it reports that a channel a client
    /// thought it belonged to no longer exists, which every subscriber
    /// needs to know regardless of whether optional event traffic is on.
    pub fn publish_channel_deleted(
        &self,
        channel: hubline_core::ChannelGuid,
        subscribers: &[ClientGuid],
    ) {
        let Some(mut envelope) = Self::build(EventType::ChannelDeleted, ClientGuid::server())
        else {
            return;
        };
        envelope.channel_guid = Some(channel);
        self.broadcast_to(&envelope, ClientGuid::server(), subscribers.iter().copied());
    }
}
