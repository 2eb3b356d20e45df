//! Per-connection machinery: the read/write loop, login gate, and heartbeat supervision.

pub mod heartbeat;
pub mod worker;

pub use heartbeat::HeartbeatSupervisor;
pub use worker::ConnectionWorker;
