//! TCP listener and per-connection framing.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use keyrelay_protocol::{Frame, HEADER_SIZE, Header, ProtocolError, check_declared_len};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Listening relay server.
pub struct RelayServer {
    config: ServerConfig,
    listener: TcpListener,
}

impl RelayServer {
    /// Binds the listener described by `config`.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.clone(), e))?;
        info!(addr = %listener.local_addr()?, "Relay server listening");
        Ok(Self { config, listener })
    }

    /// Returns the bound address. Useful when the configured port was 0.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts a single connection.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let (stream, peer) = self.listener.accept().await?;
        info!(peer = %peer, "Accepted connection");
        Ok(Connection::new(stream, peer, &self.config))
    }

    /// Accepts connections forever, spawning one task per connection.
    ///
    /// Accept failures are logged and do not stop the loop.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(conn) => {
                    tokio::spawn(handler(conn));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Connection tasks already spawned are not waited for.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                Ok(())
            }
        }
    }
}

/// Scratch buffer size used when draining an oversized payload.
const DISCARD_CHUNK: usize = 64 * 1024;

/// One frame read from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete request frame.
    Request(Frame),
    /// A frame whose declared payload exceeded the configured limit. The
    /// payload was drained, so the stream is positioned at the next header.
    Oversized(Header),
}

/// One accepted client connection.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
    max_payload: u32,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, config: &ServerConfig) -> Self {
        Self {
            stream,
            peer,
            read_timeout: config.read_timeout,
            max_payload: config.max_payload,
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Reads one request frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream before sending any
    /// byte of a new header. A stream that ends inside a header or payload is
    /// an [`ProtocolError::Incomplete`] error. The idle timeout applies to
    /// each read, so a slow peer that keeps sending is never cut off.
    pub async fn read_request(&mut self) -> ServerResult<Option<Inbound>> {
        let mut header_buf = [0u8; HEADER_SIZE];
        let got = self.fill(&mut header_buf).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(ProtocolError::Incomplete {
                expected: HEADER_SIZE,
                received: got,
            }
            .into());
        }

        let header = Header::decode(&header_buf);
        let len = match check_declared_len(header.payload_len, self.max_payload) {
            Ok(len) => len,
            Err(e) => {
                let len = header.payload_len as usize;
                debug!(peer = %self.peer, code = header.code, error = %e, "Draining payload");
                let got = self.discard(len).await?;
                if got < len {
                    return Err(ProtocolError::Incomplete {
                        expected: len,
                        received: got,
                    }
                    .into());
                }
                return Ok(Some(Inbound::Oversized(header)));
            }
        };

        let mut payload = vec![0u8; len];
        let got = self.fill(&mut payload).await?;
        if got < len {
            return Err(ProtocolError::Incomplete {
                expected: len,
                received: got,
            }
            .into());
        }

        debug!(
            peer = %self.peer,
            code = header.code,
            payload_len = len,
            "Read request frame"
        );
        Ok(Some(Inbound::Request(Frame::from_parts(header, payload))))
    }

    /// Writes one response frame.
    pub async fn write_response(&mut self, frame: &Frame) -> ServerResult<()> {
        let bytes = frame.encode()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads until `buf` is full or the peer closes, returning the byte count.
    async fn fill(&mut self, buf: &mut [u8]) -> ServerResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.stream.read(&mut buf[filled..]);
            let n = with_timeout(self.read_timeout, self.peer, read).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Reads and drops up to `len` bytes, returning how many arrived.
    async fn discard(&mut self, len: usize) -> ServerResult<usize> {
        let mut scratch = vec![0u8; DISCARD_CHUNK.min(len)];
        let mut drained = 0;
        while drained < len {
            let want = (len - drained).min(scratch.len());
            let got = self.fill(&mut scratch[..want]).await?;
            drained += got;
            if got < want {
                break;
            }
        }
        Ok(drained)
    }
}

/// Applies the optional idle timeout to a single read.
async fn with_timeout<T>(
    timeout: Option<Duration>,
    peer: SocketAddr,
    fut: impl Future<Output = io::Result<T>>,
) -> ServerResult<T> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServerError::Timeout { peer }),
        },
        None => Ok(fut.await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::ClientId;
    use keyrelay_protocol::{PROTOCOL_VERSION, RequestCode, ResponseCode};

    async fn local_server(read_timeout: Option<Duration>) -> RelayServer {
        let config = ServerConfig::new("127.0.0.1", 0).with_read_timeout(read_timeout);
        RelayServer::bind(config).await.unwrap()
    }

    fn send_header(payload_len: u32) -> [u8; HEADER_SIZE] {
        Header {
            client_id: ClientId::ZERO,
            version: PROTOCOL_VERSION,
            code: 603,
            payload_len,
        }
        .encode()
    }

    fn expect_request(inbound: Option<Inbound>) -> Frame {
        match inbound {
            Some(Inbound::Request(frame)) => frame,
            other => panic!("expected a request frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let server = local_server(None).await;
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let server = local_server(None).await;
        let port = server.local_addr().unwrap().port();

        let result = RelayServer::bind(ServerConfig::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn connection_roundtrip() {
        let server = local_server(None).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let request = Frame::request(
                ClientId::ZERO,
                PROTOCOL_VERSION,
                RequestCode::ListUsers,
                Vec::new(),
            );
            stream.write_all(&request.encode().unwrap()).await.unwrap();

            let mut header = [0u8; HEADER_SIZE];
            stream.read_exact(&mut header).await.unwrap();
            let header = Header::decode(&header);
            assert_eq!(header.code, 2101);
            assert_eq!(header.payload_len, 0);
        });

        let mut conn = server.accept().await.unwrap();
        let request = expect_request(conn.read_request().await.unwrap());
        assert_eq!(request.code, 601);
        assert!(request.payload.is_empty());

        conn.write_response(&Frame::response(
            PROTOCOL_VERSION,
            ResponseCode::UserList,
            Vec::new(),
        ))
        .await
        .unwrap();

        client.await.unwrap();
    }

    #[tokio::test]
    async fn clean_close_returns_none() {
        let server = local_server(None).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let _stream = TcpStream::connect(addr).await.unwrap();
        });

        let mut conn = server.accept().await.unwrap();
        client.await.unwrap();
        assert!(conn.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_header_is_incomplete() {
        let server = local_server(None).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&[0u8; 10]).await.unwrap();
        });

        let mut conn = server.accept().await.unwrap();
        client.await.unwrap();
        let result = conn.read_request().await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::Incomplete { expected: 23, received: 10 }))
        ));
    }

    #[tokio::test]
    async fn truncated_payload_reports_bytes_received() {
        let server = local_server(None).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&send_header(100)).await.unwrap();
            stream.write_all(&[1u8; 30]).await.unwrap();
        });

        let mut conn = server.accept().await.unwrap();
        client.await.unwrap();
        let result = conn.read_request().await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::Incomplete { expected: 100, received: 30 }))
        ));
    }

    #[tokio::test]
    async fn oversized_payload_is_drained_and_stream_stays_usable() {
        let config = ServerConfig::new("127.0.0.1", 0).with_max_payload(16);
        let server = RelayServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&send_header(100)).await.unwrap();
            stream.write_all(&[7u8; 100]).await.unwrap();
            let next = Frame::request(
                ClientId::ZERO,
                PROTOCOL_VERSION,
                RequestCode::ListUsers,
                Vec::new(),
            );
            stream.write_all(&next.encode().unwrap()).await.unwrap();
            stream
        });

        let mut conn = server.accept().await.unwrap();
        let _stream = client.await.unwrap();

        match conn.read_request().await.unwrap() {
            Some(Inbound::Oversized(header)) => {
                assert_eq!(header.code, 603);
                assert_eq!(header.payload_len, 100);
            }
            other => panic!("expected an oversized frame, got {:?}", other),
        }
        let next = expect_request(conn.read_request().await.unwrap());
        assert_eq!(next.code, 601);
    }

    #[tokio::test]
    async fn oversized_payload_cut_short_is_incomplete() {
        let server = local_server(None).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&send_header(u32::MAX)).await.unwrap();
            stream.write_all(&[0u8; 10]).await.unwrap();
        });

        let mut conn = server.accept().await.unwrap();
        client.await.unwrap();
        let result = conn.read_request().await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::Incomplete { received: 10, .. }))
        ));
    }

    #[tokio::test]
    async fn slow_payload_within_idle_timeout_is_read() {
        let server = local_server(Some(Duration::from_millis(200))).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&send_header(40)).await.unwrap();
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                stream.write_all(&[3u8; 10]).await.unwrap();
            }
            stream
        });

        let mut conn = server.accept().await.unwrap();
        let request = expect_request(conn.read_request().await.unwrap());
        assert_eq!(request.payload, vec![3u8; 40]);
        let _stream = client.await.unwrap();
    }

    #[tokio::test]
    async fn idle_peer_times_out() {
        let server = local_server(Some(Duration::from_millis(50))).await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let mut conn = server.accept().await.unwrap();
        let _stream = client.await.unwrap();
        let result = conn.read_request().await;
        assert!(matches!(result, Err(ServerError::Timeout { .. })));
    }
}
