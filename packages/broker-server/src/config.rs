//! Runtime configuration for a [`crate::server::Broker`].
//!
//! `BrokerConfig` is a plain struct with no dependency on `clap`, so the
//! core server type stays embeddable. The `hubline-server` binary is the
//! one place that builds a `BrokerConfig` from command-line flags.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for a running broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bind address for the listener.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration. When absent the listener serves plain TCP.
    pub tls: Option<TlsConfig>,
    /// Heartbeat probing interval. Zero disables heartbeat probing entirely.
    pub heartbeat_interval: Duration,
    /// Number of consecutive heartbeat failures before a client is evicted.
    pub max_heartbeat_failures: u32,
    /// How long a sync request waits for its correlated reply before timing out.
    pub sync_timeout: Duration,
    /// Whether successful async sends are acknowledged back to the sender.
    pub ack_sends: bool,
    /// Whether `ClientJoinedServer` / `ClientLeftServer` events are published.
    pub server_join_events: bool,
    /// Whether `ClientJoinedChannel` / `ClientLeftChannel` events are published.
    pub channel_events: bool,
    /// Bounded mpsc channel capacity for outbound messages per connection.
    pub outbound_channel_capacity: usize,
    /// How long to wait for in-flight work to drain during shutdown.
    pub drain_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            heartbeat_interval: Duration::from_secs(15),
            max_heartbeat_failures: 3,
            sync_timeout: Duration::from_secs(10),
            ack_sends: true,
            server_join_events: true,
            channel_events: true,
            outbound_channel_capacity: 256,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// TLS certificate material for the listener.
///
/// No `Default` impl: certificate paths have no sensible default.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain.
    pub cert_path: PathBuf,
    /// Path to the PEM private key.
    pub key_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_config_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert!(config.tls.is_none());
        assert_eq!(config.max_heartbeat_failures, 3);
        assert!(config.ack_sends);
        assert!(config.server_join_events);
        assert!(config.channel_events);
    }

    #[test]
    fn tls_config_constructs_manually() {
        let tls = TlsConfig {
            cert_path: PathBuf::from("/tmp/cert.pem"),
            key_path: PathBuf::from("/tmp/key.pem"),
        };
        assert_eq!(tls.cert_path, PathBuf::from("/tmp/cert.pem"));
    }
}
