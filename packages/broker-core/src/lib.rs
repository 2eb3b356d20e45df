//! Hubline Core -- the wire message envelope, its JSON codec, and the
//! command/event vocabulary shared between client and server.
//!
//! - **Envelope** ([`envelope`]): the single message shape that carries
//!   control commands, directed payloads, channel payloads, and replies.
//! - **Ids** ([`ids`]): `ClientGuid`, `ChannelGuid`, `MessageId` newtypes.
//! - **Command** ([`command`]): the case-insensitive control-plane vocabulary.
//! - **Event** ([`event`]): system event payloads embedded in envelope data.
//! - **Error** ([`error`]): envelope-layer error types.

pub mod command;
pub mod envelope;
pub mod error;
pub mod event;
pub mod ids;

pub use command::{Command, UnknownCommand};
pub use envelope::Envelope;
pub use error::EnvelopeError;
pub use event::{EventEnvelope, EventType};
pub use ids::{ChannelGuid, ClientGuid, MessageId};
