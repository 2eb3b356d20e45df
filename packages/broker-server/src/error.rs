//! Error taxonomy for the server crate.

use thiserror::Error;

/// Errors raised by the client/channel registries.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a channel with this name already exists")]
    ChannelNameTaken,
    #[error("channel not found")]
    ChannelNotFound,
    #[error("client not found")]
    ClientNotFound,
}

/// Errors raised while reading or writing framed messages.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer closed the connection")]
    EndOfStream,
    #[error("malformed frame: {0}")]
    Malformed(#[from] hubline_core::EnvelopeError),
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed reasons a processed command can fail, reported back to the caller
/// via the envelope's `success` flag and, for replies, its `data`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("login is required before this command can be used")]
    LoginRequired,
    #[error("client is not a member of this channel")]
    NotChannelMember,
    #[error("recipient not found")]
    RecipientNotFound,
    #[error("channel not found")]
    ChannelNotFound,
    #[error("a channel with this name already exists")]
    AlreadyExists,
    #[error("delete failed")]
    DeleteFailure,
    #[error("unrecognized command")]
    UnknownCommand,
    #[error("login failed")]
    LoginFailed,
}

impl From<RegistryError> for ProcessorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ChannelNameTaken => Self::AlreadyExists,
            RegistryError::ChannelNotFound => Self::ChannelNotFound,
            RegistryError::ClientNotFound => Self::RecipientNotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_maps_to_processor_error() {
        assert_eq!(
            ProcessorError::from(RegistryError::ChannelNameTaken),
            ProcessorError::AlreadyExists
        );
        assert_eq!(
            ProcessorError::from(RegistryError::ClientNotFound),
            ProcessorError::RecipientNotFound
        );
    }
}
