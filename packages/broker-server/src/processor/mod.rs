//! Dispatches incoming envelopes: control commands through the command
//! table, everything else as a directed or channel-addressed delivery.

pub mod commands;

use std::sync::Arc;

use hubline_core::{ChannelGuid, ClientGuid, Envelope};
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::error::ProcessorError;
use crate::events::EventPublisher;
use crate::registry::{ChannelRegistry, ClientRegistry};

/// A side effect that must run only after the immediate reply has been
/// written to the wire, preserving "reply first, then event" ordering.
#[derive(Debug, Clone)]
pub enum PostReplyEffect {
    PublishServerJoin(ClientGuid),
    PublishChannelJoin(ChannelGuid, ClientGuid),
    PublishChannelLeave(ChannelGuid, ClientGuid),
    PublishChannelDeleted(ChannelGuid, Vec<ClientGuid>),
}

impl PostReplyEffect {
    pub fn apply(self, events: &EventPublisher) {
        match self {
            Self::PublishServerJoin(client) => events.publish_server_membership(client, true),
            Self::PublishChannelJoin(channel, client) => {
                events.publish_channel_membership(channel, client, true);
            }
            Self::PublishChannelLeave(channel, client) => {
                events.publish_channel_membership(channel, client, false);
            }
            Self::PublishChannelDeleted(channel, subscribers) => {
                events.publish_channel_deleted(channel, &subscribers);
            }
        }
    }
}

/// What the processor decided to do with one incoming envelope.
pub struct Outcome {
    /// The reply to send back to the sender, if this envelope warrants one.
    pub reply: Option<Envelope>,
    /// Events to publish once `reply` has been written to the wire.
    pub post_reply: Vec<PostReplyEffect>,
}

/// Routes every incoming envelope to either the command table or directed
/// delivery, and decides what (if anything) to reply to the sender.
pub struct MessageProcessor {
    clients: Arc<ClientRegistry>,
    channels: Arc<ChannelRegistry>,
    config: Arc<BrokerConfig>,
}

impl MessageProcessor {
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        channels: Arc<ChannelRegistry>,
        config: Arc<BrokerConfig>,
    ) -> Self {
        Self { clients, channels, config }
    }

    /// Processes one envelope received from `sender`.
    pub fn process(&self, sender: ClientGuid, envelope: Envelope) -> Outcome {
        if let Some(command) = envelope.command {
            return self.process_command(sender, command, envelope);
        }
        self.process_delivery(sender, envelope)
    }

    fn process_command(
        &self,
        sender: ClientGuid,
        command: hubline_core::Command,
        envelope: Envelope,
    ) -> Outcome {
        match commands::dispatch(&self.clients, &self.channels, sender, command, &envelope) {
            Ok(result) => Outcome {
                reply: Some(envelope.reply_with_data_opt(true, result.data)),
                post_reply: result.post_reply,
            },
            Err(err) => {
                debug!(%err, ?command, "command failed");
                Outcome {
                    reply: Some(envelope.reply_with_data_opt(
                        false,
                        Some(err.to_string().into_bytes()),
                    )),
                    post_reply: Vec::new(),
                }
            }
        }
    }

    fn process_delivery(&self, sender: ClientGuid, envelope: Envelope) -> Outcome {
        let Some(sender_entry) = self.clients.get_client(sender) else {
            return Outcome { reply: None, post_reply: Vec::new() };
        };
        if !sender_entry.is_logged_in() {
            return self.deny(&envelope, ProcessorError::LoginRequired);
        }

        if let Some(sync_response_to) = envelope.sync_response_to {
            self.deliver_sync_reply(sender, sync_response_to, &envelope);
        }

        if let Some(recipient) = envelope.recipient_guid {
            return self.deliver_private(sender, recipient, envelope);
        }
        if let Some(channel) = envelope.channel_guid {
            return self.deliver_channel(sender, channel, envelope);
        }

        // A bare reply with no further addressing: nothing more to route.
        Outcome { reply: None, post_reply: Vec::new() }
    }

    fn deliver_sync_reply(
        &self,
        sender: ClientGuid,
        original_request_id: hubline_core::MessageId,
        envelope: &Envelope,
    ) {
        let Some(requester) = envelope.recipient_guid.and_then(|g| self.clients.get_client(g))
        else {
            return;
        };
        let mut addressed = envelope.clone();
        addressed.sender_guid = Some(sender);
        if !requester.correlator.deliver(original_request_id, addressed) {
            warn!(%original_request_id, "sync reply arrived with no matching waiter");
        }
    }

    fn deliver_private(&self, sender: ClientGuid, recipient: ClientGuid, envelope: Envelope) -> Outcome {
        let Some(recipient_entry) = self.clients.get_client(recipient) else {
            return self.deny(&envelope, ProcessorError::RecipientNotFound);
        };

        let mut addressed = envelope.clone();
        addressed.sender_guid = Some(sender);
        let delivered = recipient_entry.try_send(addressed);

        // A sync request correlates its own reply by `MessageId` on the
        // requester's end; an extra send-ack here would be mistaken for it.
        // A sync response is itself already routed above in `deliver_sync_reply`.
        if envelope.sync_request || envelope.sync_response_to.is_some() {
            return Outcome { reply: None, post_reply: Vec::new() };
        }
        if self.config.ack_sends {
            let result = if delivered { Ok(()) } else { Err(ProcessorError::RecipientNotFound) };
            return self.maybe_ack(&envelope, result);
        }
        Outcome { reply: None, post_reply: Vec::new() }
    }

    fn deliver_channel(&self, sender: ClientGuid, channel: ChannelGuid, envelope: Envelope) -> Outcome {
        let Some(entry) = self.channels.get_by_guid(channel) else {
            return self.deny(&envelope, ProcessorError::ChannelNotFound);
        };
        if !entry.is_subscriber(sender) {
            return self.deny(&envelope, ProcessorError::NotChannelMember);
        }

        for recipient in entry.subscribers() {
            if recipient == sender {
                continue;
            }
            if let Some(recipient_entry) = self.clients.get_client(recipient) {
                let mut addressed = envelope.clone();
                addressed.sender_guid = Some(sender);
                addressed.recipient_guid = Some(recipient);
                let _ = recipient_entry.try_send(addressed);
            }
        }

        if envelope.sync_request || self.config.ack_sends {
            return self.maybe_ack(&envelope, Ok(()));
        }
        Outcome { reply: None, post_reply: Vec::new() }
    }

    fn maybe_ack(&self, envelope: &Envelope, result: Result<(), ProcessorError>) -> Outcome {
        let reply = match result {
            Ok(()) => envelope.reply_to(true),
            Err(err) => envelope.reply_with_data(false, err.to_string().into_bytes()),
        };
        Outcome { reply: Some(reply), post_reply: Vec::new() }
    }

    fn deny(&self, envelope: &Envelope, err: ProcessorError) -> Outcome {
        Outcome {
            reply: Some(envelope.reply_with_data(false, err.to_string().into_bytes())),
            post_reply: Vec::new(),
        }
    }
}
