//! Identifier newtypes shared by the wire envelope and the server registries.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a logged-in client. Assigned by the server on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientGuid(pub Uuid);

/// Identifies a channel. Assigned by the server on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelGuid(pub Uuid);

/// Identifies a single envelope, used to correlate a sync request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

macro_rules! guid_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The reserved identifier used to address the server itself.
            #[must_use]
            pub const fn server() -> Self {
                Self(Uuid::nil())
            }

            /// Whether this identifier is the reserved server identifier.
            #[must_use]
            pub fn is_server(self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$ty> for Uuid {
            fn from(id: $ty) -> Self {
                id.0
            }
        }
    };
}

guid_newtype!(ClientGuid);
guid_newtype!(ChannelGuid);
guid_newtype!(MessageId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_guid_is_nil() {
        assert!(ClientGuid::server().is_server());
        assert_eq!(ClientGuid::server().to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn new_guid_is_not_server() {
        assert!(!ClientGuid::new().is_server());
    }

    #[test]
    fn guids_are_distinct() {
        assert_ne!(ClientGuid::new(), ClientGuid::new());
    }

    #[test]
    fn json_roundtrip() {
        let id = MessageId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
