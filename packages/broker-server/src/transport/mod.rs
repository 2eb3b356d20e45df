//! The framed transport: one abstraction over plain TCP and TLS-wrapped
//! streams, carrying length-prefixed JSON envelopes.

pub mod frame;
pub mod tls;

pub use frame::{FramedTransport, PeerStream};
pub use tls::load_tls_acceptor;
