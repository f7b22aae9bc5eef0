use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

use crate::protocol::error::{ProtocolErrorKind, Result, RpcError, TransportErrorKind};
use crate::transport::{Endpoint, Protocol, ProtocolFactory, SharedTransport, Transport, TransportFactory};

/// Largest message [`StreamProtocol`] accepts.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// TCP socket transport.
///
/// Connects lazily on [`open`](Transport::open) and drops the socket on
/// [`close`](Transport::close). Connecting, reading and writing are each
/// bounded by the rpc timeout.
///
/// # Example
///
/// ```no_run
/// use ferrule_common::transport::{Endpoint, TcpTransport, Transport};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::new(Endpoint::new("127.0.0.1", 9090), Duration::from_secs(2));
/// transport.open().await?;
/// assert!(transport.is_open());
/// transport.close().await;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport {
    endpoint: Endpoint,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
    open: AtomicBool,
}

impl TcpTransport {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            stream: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Locks the underlying socket. `None` while the transport is closed.
    pub async fn stream(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.stream.lock().await
    }

    fn not_open(&self) -> RpcError {
        RpcError::transport(
            TransportErrorKind::NotOpen,
            format!("Socket to {} is not open", self.endpoint),
        )
    }

    fn timed_out(&self, action: &str) -> RpcError {
        RpcError::transport(
            TransportErrorKind::TimedOut,
            format!("Timed out {} {} after {:?}", action, self.endpoint, self.timeout),
        )
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.endpoint.to_string();
        let socket_addrs = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| Self::map_io_error(e, &addr, self.timeout))?;

        // Try each resolved address until one succeeds
        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(self.timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => last_err = Some(Self::map_io_error(e, &addr, self.timeout)),
                Err(_) => {
                    last_err = Some(RpcError::transport(
                        TransportErrorKind::TimedOut,
                        format!("Timed out connecting to {} after {:?}", addr, self.timeout),
                    ))
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RpcError::transport(
                TransportErrorKind::NotOpen,
                format!("Could not resolve {}", addr),
            )
        }))
    }

    /// Map IO errors to transport errors
    ///
    /// - Timeouts/would block -> `Timeout`
    /// - Connection lost -> `Transport(EndOfFile)`
    /// - Everything else stays an OS error (`Io`)
    fn map_io_error(err: std::io::Error, addr: &str, timeout: Duration) -> RpcError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                RpcError::Timeout(format!("{} did not answer within {:?}", addr, timeout))
            }
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => RpcError::transport(
                TransportErrorKind::EndOfFile,
                format!("{}: Connection lost", addr),
            ),
            _ => RpcError::Io(err),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self) -> Result<()> {
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Err(RpcError::transport(
                TransportErrorKind::AlreadyOpen,
                format!("Socket to {} is already open", self.endpoint),
            ));
        }

        *stream = Some(self.connect().await?);
        self.open.store(true, Ordering::SeqCst);
        tracing::debug!(endpoint = %self.endpoint, "Transport opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let mut stream = self.stream.lock().await;
        if stream.take().is_some() {
            tracing::debug!(endpoint = %self.endpoint, "Transport closed");
        }
        self.open.store(false, Ordering::SeqCst);
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| self.not_open())?;
        let addr = self.endpoint.to_string();

        let io = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        match tokio::time::timeout(self.timeout, io).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Self::map_io_error(e, &addr, self.timeout)),
            Err(_) => Err(self.timed_out("writing to")),
        }
    }

    async fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or_else(|| self.not_open())?;
        let addr = self.endpoint.to_string();

        match tokio::time::timeout(self.timeout, stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Self::map_io_error(e, &addr, self.timeout)),
            Err(_) => Err(self.timed_out("reading from")),
        }
    }
}

/// Default transport factory: one [`TcpTransport`] per pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransportFactory;

impl TransportFactory for TcpTransportFactory {
    fn name(&self) -> &str {
        "tcp"
    }

    fn build(&self, endpoint: &Endpoint, rpc_timeout: Duration) -> Result<SharedTransport> {
        Ok(Arc::new(TcpTransport::new(endpoint.clone(), rpc_timeout)))
    }
}

/// Length-prefixed message framing.
///
/// Wire format: `[4-byte length as u32 big-endian] + [data]`. Messages
/// larger than [`MAX_MESSAGE_SIZE`] are refused in both directions.
pub struct StreamProtocol {
    transport: SharedTransport,
}

impl StreamProtocol {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    fn too_large(len: usize) -> RpcError {
        RpcError::protocol(
            ProtocolErrorKind::SizeLimit,
            format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            ),
        )
    }
}

#[async_trait]
impl Protocol for StreamProtocol {
    fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    async fn send_message(&self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(Self::too_large(data.len()));
        }

        let mut frame = Vec::with_capacity(4 + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(data);
        self.transport.write(&frame).await
    }

    async fn receive_message(&self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.transport.read_exact(&mut len_buf).await?;

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(Self::too_large(len));
        }

        let mut buf = vec![0u8; len];
        self.transport.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamProtocolFactory;

impl ProtocolFactory for StreamProtocolFactory {
    fn name(&self) -> &str {
        "stream"
    }

    fn build(&self, transport: SharedTransport) -> Arc<dyn Protocol> {
        Arc::new(StreamProtocol::new(transport))
    }
}
