//! Per-command handlers invoked by [`super::MessageProcessor`].

use hubline_core::{ChannelGuid, ClientGuid, Command, Envelope};
use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;
use crate::registry::{ChannelRegistry, ClientRegistry};

use super::PostReplyEffect;

/// The outcome of dispatching one command: an optional reply payload, plus
/// any events that must be published only after the reply itself is sent.
pub struct CommandResult {
    pub data: Option<Vec<u8>>,
    pub post_reply: Vec<PostReplyEffect>,
}

impl CommandResult {
    fn data_only(data: Option<Vec<u8>>) -> Self {
        Self { data, post_reply: Vec::new() }
    }
}

#[derive(Serialize, Deserialize)]
struct ChannelSummary {
    guid: ChannelGuid,
    name: String,
    private: bool,
}

#[derive(Deserialize)]
struct CreateChannelRequest {
    name: String,
    #[serde(default)]
    private: bool,
}

const COMMANDS_REQUIRING_LOGIN: &[Command] = &[
    Command::Echo,
    Command::HeartbeatRequest,
    Command::JoinChannel,
    Command::LeaveChannel,
    Command::CreateChannel,
    Command::DeleteChannel,
    Command::ListChannels,
    Command::ListChannelSubscribers,
    Command::ListClients,
    Command::IsClientConnected,
];

/// Dispatches one control-plane command.
///
/// # Errors
///
/// Returns the typed [`ProcessorError`] reason a command could not complete.
pub fn dispatch(
    clients: &ClientRegistry,
    channels: &ChannelRegistry,
    sender: ClientGuid,
    command: Command,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let sender_entry = clients.get_client(sender).ok_or(ProcessorError::RecipientNotFound)?;

    if COMMANDS_REQUIRING_LOGIN.contains(&command) && !sender_entry.is_logged_in() {
        return Err(ProcessorError::LoginRequired);
    }

    match command {
        Command::Echo => Ok(CommandResult::data_only(envelope.data.clone())),
        Command::Login => login(&sender_entry, envelope, sender),
        Command::HeartbeatRequest => Ok(CommandResult::data_only(None)),
        Command::JoinChannel => join_channel(channels, sender, envelope),
        Command::LeaveChannel => leave_channel(channels, sender, envelope),
        Command::CreateChannel => create_channel(channels, sender, envelope),
        Command::DeleteChannel => delete_channel(channels, sender, envelope),
        Command::ListChannels => list_channels(channels, sender),
        Command::ListChannelSubscribers => list_channel_subscribers(channels, sender, envelope),
        Command::ListClients => list_clients(clients),
        Command::IsClientConnected => is_client_connected(clients, envelope),
    }
}

fn login(
    sender_entry: &crate::registry::ClientEntry,
    envelope: &Envelope,
    sender: ClientGuid,
) -> Result<CommandResult, ProcessorError> {
    let Some(email) = envelope.email.as_deref().filter(|e| !e.is_empty()) else {
        return Err(ProcessorError::LoginFailed);
    };

    sender_entry.set_logged_in(email.to_string());
    Ok(CommandResult {
        data: None,
        post_reply: vec![PostReplyEffect::PublishServerJoin(sender)],
    })
}

fn channel_guid_arg(envelope: &Envelope) -> Result<ChannelGuid, ProcessorError> {
    envelope.channel_guid.ok_or(ProcessorError::ChannelNotFound)
}

fn join_channel(
    channels: &ChannelRegistry,
    sender: ClientGuid,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let guid = channel_guid_arg(envelope)?;
    let newly_joined = channels.add_subscriber(guid, sender)?;
    let post_reply = if newly_joined {
        vec![PostReplyEffect::PublishChannelJoin(guid, sender)]
    } else {
        Vec::new()
    };
    Ok(CommandResult { data: None, post_reply })
}

fn leave_channel(
    channels: &ChannelRegistry,
    sender: ClientGuid,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let guid = channel_guid_arg(envelope)?;
    let entry = channels.get_by_guid(guid).ok_or(ProcessorError::ChannelNotFound)?;

    if entry.owner == sender {
        let subscribers = entry.subscribers();
        channels.remove_channel(guid)?;
        return Ok(CommandResult {
            data: None,
            post_reply: vec![PostReplyEffect::PublishChannelDeleted(guid, subscribers)],
        });
    }

    let was_member = channels.remove_subscriber(guid, sender)?;
    let post_reply = if was_member {
        vec![PostReplyEffect::PublishChannelLeave(guid, sender)]
    } else {
        Vec::new()
    };
    Ok(CommandResult { data: None, post_reply })
}

fn create_channel(
    channels: &ChannelRegistry,
    sender: ClientGuid,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let request: CreateChannelRequest = envelope
        .data
        .as_deref()
        .and_then(|bytes| serde_json::from_slice(bytes).ok())
        .filter(|request: &CreateChannelRequest| !request.name.is_empty())
        .ok_or(ProcessorError::ChannelNotFound)?;

    let entry = channels.add_channel(request.name, sender, request.private)?;
    Ok(CommandResult::data_only(Some(entry.guid.to_string().into_bytes())))
}

fn delete_channel(
    channels: &ChannelRegistry,
    sender: ClientGuid,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let guid = channel_guid_arg(envelope)?;
    let entry = channels.get_by_guid(guid).ok_or(ProcessorError::ChannelNotFound)?;
    if entry.owner != sender {
        return Err(ProcessorError::DeleteFailure);
    }

    let subscribers = entry.subscribers();
    channels.remove_channel(guid)?;
    Ok(CommandResult {
        data: None,
        post_reply: vec![PostReplyEffect::PublishChannelDeleted(guid, subscribers)],
    })
}

fn list_channels(
    channels: &ChannelRegistry,
    requester: ClientGuid,
) -> Result<CommandResult, ProcessorError> {
    let summaries: Vec<ChannelSummary> = channels
        .all_channels()
        .iter()
        .filter(|c| !c.private || c.owner == requester)
        .map(|c| ChannelSummary { guid: c.guid, name: c.name.clone(), private: c.private })
        .collect();
    let data = serde_json::to_vec(&summaries).map_err(|_| ProcessorError::ChannelNotFound)?;
    Ok(CommandResult::data_only(Some(data)))
}

fn list_channel_subscribers(
    channels: &ChannelRegistry,
    sender: ClientGuid,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let guid = channel_guid_arg(envelope)?;
    let entry = channels.get_by_guid(guid).ok_or(ProcessorError::ChannelNotFound)?;
    if !entry.is_subscriber(sender) {
        return Err(ProcessorError::NotChannelMember);
    }
    let data = serde_json::to_vec(&entry.subscribers()).map_err(|_| ProcessorError::ChannelNotFound)?;
    Ok(CommandResult::data_only(Some(data)))
}

fn list_clients(clients: &ClientRegistry) -> Result<CommandResult, ProcessorError> {
    let guids: Vec<ClientGuid> = clients
        .all_clients()
        .iter()
        .filter(|c| c.is_logged_in())
        .map(|c| c.guid)
        .collect();
    let data = serde_json::to_vec(&guids).map_err(|_| ProcessorError::RecipientNotFound)?;
    Ok(CommandResult::data_only(Some(data)))
}

fn is_client_connected(
    clients: &ClientRegistry,
    envelope: &Envelope,
) -> Result<CommandResult, ProcessorError> {
    let target = envelope.recipient_guid.ok_or(ProcessorError::RecipientNotFound)?;
    let connected = clients.is_client_connected(target);
    let data = serde_json::to_vec(&connected).map_err(|_| ProcessorError::RecipientNotFound)?;
    Ok(CommandResult::data_only(Some(data)))
}
