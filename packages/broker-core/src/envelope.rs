//! The wire-level message envelope.
//!
//! Every frame exchanged between a client and the server is one JSON
//! document matching [`Envelope`]. The same shape carries control commands,
//! directed payloads, channel payloads, sync replies, and system events —
//! which field is populated, and which is absent, is what distinguishes them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::command::Command;
use crate::ids::{ChannelGuid, ClientGuid, MessageId};

/// One message on the wire, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique id of this envelope. Generated by whoever sends it.
    pub message_id: MessageId,
    /// Who sent this envelope. The server fills this in for messages it forwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_guid: Option<ClientGuid>,
    /// The single client this envelope is addressed to, for a private message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_guid: Option<ClientGuid>,
    /// The channel this envelope is addressed to, for a channel publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_guid: Option<ChannelGuid>,
    /// The control-plane command this envelope invokes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    /// When this envelope was created.
    pub created_utc: DateTime<Utc>,
    /// Login credential: account email. Stripped before logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Login credential: account password. Stripped before logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether the sender expects a correlated reply.
    #[serde(default)]
    pub sync_request: bool,
    /// The `message_id` of the request this envelope answers, if it is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_response_to: Option<MessageId>,
    /// Whether the operation this envelope reports on succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Opaque application payload, base64-encoded on the wire.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_data",
        deserialize_with = "deserialize_data"
    )]
    pub data: Option<Vec<u8>>,
}

impl Envelope {
    /// Builds a bare envelope with a fresh id and the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self {
            message_id: MessageId::new(),
            sender_guid: None,
            recipient_guid: None,
            channel_guid: None,
            command: None,
            created_utc: Utc::now(),
            email: None,
            password: None,
            sync_request: false,
            sync_response_to: None,
            success: None,
            data: None,
        }
    }

    /// Builds a reply envelope correlated to `self` via `sync_response_to`.
    #[must_use]
    pub fn reply_to(&self, success: bool) -> Self {
        Self {
            sender_guid: Some(ClientGuid::server()),
            recipient_guid: self.sender_guid,
            sync_response_to: Some(self.message_id),
            success: Some(success),
            ..Self::new()
        }
    }

    /// Builds a reply envelope carrying a data payload.
    #[must_use]
    pub fn reply_with_data(&self, success: bool, data: Vec<u8>) -> Self {
        let mut env = self.reply_to(success);
        env.data = Some(data);
        env
    }

    /// Builds a reply envelope carrying an optional data payload.
    #[must_use]
    pub fn reply_with_data_opt(&self, success: bool, data: Option<Vec<u8>>) -> Self {
        let mut env = self.reply_to(success);
        env.data = data;
        env
    }

    /// Returns a clone with `email` and `password` cleared, safe to log or echo back.
    #[must_use]
    pub fn redact(&self) -> Self {
        let mut copy = self.clone();
        copy.email = None;
        copy.password = None;
        copy
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_data<S: Serializer>(
    data: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match data {
        Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_data<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<u8>>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(s) => BASE64
            .decode(s.as_bytes())
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_preserves_fields() {
        let mut env = Envelope::new();
        env.sender_guid = Some(ClientGuid::new());
        env.recipient_guid = Some(ClientGuid::new());
        env.command = Some(Command::Echo);
        env.data = Some(vec![1, 2, 3, 255]);

        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.message_id, env.message_id);
        assert_eq!(back.sender_guid, env.sender_guid);
        assert_eq!(back.recipient_guid, env.recipient_guid);
        assert_eq!(back.command, env.command);
        assert_eq!(back.data, env.data);
    }

    #[test]
    fn data_is_base64_on_the_wire() {
        let mut env = Envelope::new();
        env.data = Some(b"hi".to_vec());
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["data"], "aGk=");
    }

    #[test]
    fn redact_clears_credentials() {
        let mut env = Envelope::new();
        env.email = Some("user@example.com".to_string());
        env.password = Some("hunter2".to_string());
        let redacted = env.redact();
        assert!(redacted.email.is_none());
        assert!(redacted.password.is_none());
        // Original is untouched.
        assert!(env.email.is_some());
    }

    #[test]
    fn reply_to_correlates_and_addresses_sender() {
        let mut request = Envelope::new();
        request.sender_guid = Some(ClientGuid::new());

        let reply = request.reply_to(true);
        assert_eq!(reply.sync_response_to, Some(request.message_id));
        assert_eq!(reply.recipient_guid, request.sender_guid);
        assert_eq!(reply.sender_guid, Some(ClientGuid::server()));
        assert_eq!(reply.success, Some(true));
    }

    #[test]
    fn absent_optional_fields_are_omitted_from_json() {
        let env = Envelope::new();
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("senderGuid").is_none());
        assert!(json.get("data").is_none());
        assert!(json.get("command").is_none());
    }
}
