//! The control-plane command vocabulary.
//!
//! A [`Command`] rides in an envelope's `command` field. Parsing is
//! case-insensitive on the wire (`"login"`, `"Login"`, and `"LOGIN"` are
//! equivalent) but serializes back out in a single canonical casing.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// A recognized control-plane operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Echo,
    Login,
    HeartbeatRequest,
    JoinChannel,
    LeaveChannel,
    CreateChannel,
    DeleteChannel,
    ListChannels,
    ListChannelSubscribers,
    ListClients,
    IsClientConnected,
}

impl Command {
    /// The canonical wire name for this command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Login => "login",
            Self::HeartbeatRequest => "heartbeatRequest",
            Self::JoinChannel => "joinChannel",
            Self::LeaveChannel => "leaveChannel",
            Self::CreateChannel => "createChannel",
            Self::DeleteChannel => "deleteChannel",
            Self::ListChannels => "listChannels",
            Self::ListChannelSubscribers => "listChannelSubscribers",
            Self::ListClients => "listClients",
            Self::IsClientConnected => "isClientConnected",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an envelope's `command` field does not match any known command.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Ok(match lower.as_str() {
            "echo" => Self::Echo,
            "login" => Self::Login,
            "heartbeatrequest" => Self::HeartbeatRequest,
            "joinchannel" => Self::JoinChannel,
            "leavechannel" => Self::LeaveChannel,
            "createchannel" => Self::CreateChannel,
            "deletechannel" => Self::DeleteChannel,
            "listchannels" => Self::ListChannels,
            "listchannelsubscribers" => Self::ListChannelSubscribers,
            "listclients" => Self::ListClients,
            "isclientconnected" => Self::IsClientConnected,
            _ => return Err(UnknownCommand(s.to_string())),
        })
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("LOGIN".parse::<Command>().unwrap(), Command::Login);
        assert_eq!("login".parse::<Command>().unwrap(), Command::Login);
        assert_eq!("LoGiN".parse::<Command>().unwrap(), Command::Login);
    }

    #[test]
    fn unknown_command_errors() {
        assert!("doSomethingElse".parse::<Command>().is_err());
    }

    #[test]
    fn json_roundtrip_uses_canonical_casing() {
        let json = serde_json::to_string(&Command::JoinChannel).unwrap();
        assert_eq!(json, "\"joinChannel\"");
        let back: Command = serde_json::from_str("\"JOINCHANNEL\"").unwrap();
        assert_eq!(back, Command::JoinChannel);
    }

    #[test]
    fn all_variants_roundtrip() {
        let all = [
            Command::Echo,
            Command::Login,
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
        for cmd in all {
            let s = cmd.as_str();
            assert_eq!(s.parse::<Command>().unwrap(), cmd);
        }
    }
}
