//! Length-delimited JSON framing over a plain or TLS-wrapped TCP stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hubline_core::Envelope;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::TransportError;

/// Either a plain or a TLS-wrapped stream socket, unified behind one read/write surface.
pub enum PeerStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl PeerStream {
    /// The peer's socket address, used for registry tie-breaks on reconnect.
    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        match self {
            Self::Plain(s) => s.peer_addr(),
            Self::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }
}

impl AsyncRead for PeerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PeerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A single client connection's framed message boundary, wrapping a [`PeerStream`].
pub struct FramedTransport {
    inner: Framed<PeerStream, LengthDelimitedCodec>,
    peer_addr: std::net::SocketAddr,
}

impl FramedTransport {
    /// Wraps a peer stream, configuring a 4-byte big-endian length prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer's address cannot be read from the socket.
    pub fn new(stream: PeerStream) -> io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let codec = LengthDelimitedCodec::builder()
            .length_field_type::<u32>()
            .big_endian()
            .max_frame_length(16 * 1024 * 1024)
            .new_codec();
        Ok(Self {
            inner: Framed::new(stream, codec),
            peer_addr,
        })
    }

    /// The remote address of this connection.
    #[must_use]
    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.peer_addr
    }

    /// Reads the next framed envelope. Returns `Ok(None)` on clean peer close.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Malformed`] if the frame does not decode as
    /// an [`Envelope`], or [`TransportError::Io`] on a transport-level failure.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, TransportError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => {
                let envelope: Envelope = serde_json::from_slice(&bytes)
                    .map_err(hubline_core::EnvelopeError::from)?;
                Ok(Some(envelope))
            }
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Ok(None),
        }
    }

    /// Writes one envelope as a length-prefixed JSON frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the underlying write fails.
    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let bytes = serde_json::to_vec(envelope).map_err(hubline_core::EnvelopeError::from)?;
        self.inner
            .send(Bytes::from(bytes))
            .await
            .map_err(TransportError::Io)
    }

    /// A best-effort, non-blocking liveness probe.
    ///
    /// Polls the underlying socket once with a no-op waker. Unsolicited bytes
    /// read during the probe are pushed back into the frame decoder's read
    /// buffer so no data is lost; a clean EOF is reported as `false`.
    pub fn is_peer_alive(&mut self) -> bool {
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut raw = [0u8; 512];
        let mut read_buf = ReadBuf::new(&mut raw);

        match Pin::new(self.inner.get_mut()).poll_read(&mut cx, &mut read_buf) {
            Poll::Pending => true,
            Poll::Ready(Err(_)) => false,
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    false
                } else {
                    self.inner.read_buffer_mut().extend_from_slice(filled);
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let (server, _) = listener.accept().await.unwrap();
        (server, client.await.unwrap())
    }

    #[tokio::test]
    async fn writes_and_reads_one_envelope() {
        let (server_sock, client_sock) = connected_pair().await;
        let mut server = FramedTransport::new(PeerStream::Plain(server_sock)).unwrap();
        let mut client = FramedTransport::new(PeerStream::Plain(client_sock)).unwrap();

        let mut env = Envelope::new();
        env.data = Some(b"hello".to_vec());

        server.write_envelope(&env).await.unwrap();
        let received = client.read_envelope().await.unwrap().unwrap();
        assert_eq!(received.message_id, env.message_id);
        assert_eq!(received.data, env.data);
    }

    #[tokio::test]
    async fn read_returns_none_on_clean_close() {
        let (server_sock, client_sock) = connected_pair().await;
        let mut client = FramedTransport::new(PeerStream::Plain(client_sock)).unwrap();
        drop(server_sock);

        let result = client.read_envelope().await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn is_peer_alive_true_when_idle() {
        let (server_sock, client_sock) = connected_pair().await;
        let mut server = FramedTransport::new(PeerStream::Plain(server_sock)).unwrap();
        let _keep_alive = client_sock;

        assert!(server.is_peer_alive());
    }

    #[tokio::test]
    async fn is_peer_alive_false_after_peer_closes() {
        let (server_sock, client_sock) = connected_pair().await;
        let mut server = FramedTransport::new(PeerStream::Plain(server_sock)).unwrap();
        drop(client_sock);

        // Give the FIN a moment to arrive.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!server.is_peer_alive());
    }

    #[tokio::test]
    async fn is_peer_alive_does_not_swallow_a_pending_frame() {
        let (server_sock, client_sock) = connected_pair().await;
        let mut server = FramedTransport::new(PeerStream::Plain(server_sock)).unwrap();
        let mut client = FramedTransport::new(PeerStream::Plain(client_sock)).unwrap();

        let env = Envelope::new();
        client.write_envelope(&env).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The probe must not discard the bytes that make up the real frame.
        assert!(server.is_peer_alive());
        let received = server.read_envelope().await.unwrap().unwrap();
        assert_eq!(received.message_id, env.message_id);
    }
}
