//! System event payloads published by the server and delivered as ordinary
//! envelopes with the server as sender.

use serde::{Deserialize, Serialize};

use crate::ids::ClientGuid;

/// The kind of lifecycle event a [`EventEnvelope`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    ClientJoinedServer,
    ClientLeftServer,
    ClientJoinedChannel,
    ClientLeftChannel,
    ChannelDeleted,
}

/// The JSON document embedded (base64-encoded) in an event envelope's `data` field.
///
/// A recipient distinguishes a system event from an ordinary payload by
/// successfully decoding `data` as this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: EventType,
    /// The client the event is about, e.g. who joined or left.
    pub data: ClientGuid,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(event_type: EventType, subject: ClientGuid) -> Self {
        Self { event_type, data: subject }
    }

    /// Encodes this event as the raw bytes that belong in an envelope's `data` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized to JSON, which
    /// should not happen for well-formed values of this type.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Attempts to interpret raw envelope `data` bytes as an event.
    #[must_use]
    pub fn try_from_payload(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_payload_bytes() {
        let subject = ClientGuid::new();
        let event = EventEnvelope::new(EventType::ClientJoinedChannel, subject);
        let bytes = event.to_payload().unwrap();
        let back = EventEnvelope::try_from_payload(&bytes).unwrap();
        assert_eq!(back.event_type, EventType::ClientJoinedChannel);
        assert_eq!(back.data, subject);
    }

    #[test]
    fn garbage_payload_is_not_an_event() {
        assert!(EventEnvelope::try_from_payload(b"not json at all").is_none());
        assert!(EventEnvelope::try_from_payload(b"{\"foo\":1}").is_none());
    }
}
