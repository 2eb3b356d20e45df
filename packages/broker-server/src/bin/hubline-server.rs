//! Command-line entrypoint: parses flags/env into a [`BrokerConfig`], runs
//! the broker to completion, and shuts down cleanly on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hubline_server::{Broker, BrokerConfig, TlsConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A hub-and-spoke messaging broker.
#[derive(Debug, Parser)]
#[command(name = "hubline-server", version, about)]
struct Args {
    /// Bind address for the listener.
    #[arg(long, env = "HUBLINE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on. 0 means OS-assigned.
    #[arg(long, env = "HUBLINE_PORT", default_value_t = 7890)]
    port: u16,

    /// Path to a PEM certificate chain. Requires `--tls-key`. Omit for plain TCP.
    #[arg(long, env = "HUBLINE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Path to a PEM private key. Requires `--tls-cert`.
    #[arg(long, env = "HUBLINE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Heartbeat probing interval, in milliseconds.
    #[arg(long, env = "HUBLINE_HEARTBEAT_INTERVAL_MS", default_value_t = 15_000)]
    heartbeat_interval_ms: u64,

    /// Consecutive heartbeat failures tolerated before a client is evicted.
    #[arg(long, env = "HUBLINE_MAX_HEARTBEAT_FAILURES", default_value_t = 3)]
    max_heartbeat_failures: u32,

    /// How long a sync request waits for its correlated reply, in milliseconds.
    #[arg(long, env = "HUBLINE_SYNC_TIMEOUT_MS", default_value_t = 10_000)]
    sync_timeout_ms: u64,

    /// Whether successful fire-and-forget sends are acknowledged back to the sender.
    #[arg(long, env = "HUBLINE_ACK_SENDS", default_value_t = true)]
    ack_sends: bool,

    /// Whether ClientJoinedServer / ClientLeftServer events are published.
    #[arg(long, env = "HUBLINE_SERVER_JOIN_EVENTS", default_value_t = true)]
    server_join_events: bool,

    /// Whether ClientJoinedChannel / ClientLeftChannel events are published.
    #[arg(long, env = "HUBLINE_CHANNEL_EVENTS", default_value_t = true)]
    channel_events: bool,

    /// How long to wait for in-flight connections to drain on shutdown, in milliseconds.
    #[arg(long, env = "HUBLINE_DRAIN_TIMEOUT_MS", default_value_t = 30_000)]
    drain_timeout_ms: u64,
}

impl From<Args> for BrokerConfig {
    fn from(args: Args) -> Self {
        let tls = match (args.tls_cert, args.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig { cert_path, key_path }),
            _ => None,
        };
        Self {
            host: args.host,
            port: args.port,
            tls,
            heartbeat_interval: Duration::from_millis(args.heartbeat_interval_ms),
            max_heartbeat_failures: args.max_heartbeat_failures,
            sync_timeout: Duration::from_millis(args.sync_timeout_ms),
            ack_sends: args.ack_sends,
            server_join_events: args.server_join_events,
            channel_events: args.channel_events,
            drain_timeout: Duration::from_millis(args.drain_timeout_ms),
            ..BrokerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config: BrokerConfig = args.into();

    let mut broker = Broker::new(config);
    let port = broker.start().await?;
    info!(%port, "hubline-server started");

    let shutdown = broker.shutdown_controller();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown.trigger_shutdown();
    });

    broker.serve().await
}
