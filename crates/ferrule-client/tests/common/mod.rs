//! Test doubles shared by the integration tests.
//!
//! - [`Calculator`]: a service description whose generated client needs an
//!   open transport, like a real socket-backed client would
//! - [`RecordingTransportFactory`]: counts transports built, opened and closed
//! - [`Flaky`]: in-process implementation failing a scripted number of times
//! - [`RemoteCalculator`] / [`spawn_calculator_server`]: the calculator over
//!   a real socket, one JSON message per call

#![allow(dead_code)]

use async_trait::async_trait;
use ferrule_common::{
    Endpoint, Protocol, ProtocolErrorKind, Result, Rpc, RpcError, RpcResult, ServiceClient,
    ServiceDescription, SharedTransport, Transport, TransportErrorKind, TransportFactory,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Default)]
pub struct TransportStats {
    pub built: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl TransportStats {
    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct RecordingTransport {
    stats: Arc<TransportStats>,
    open: AtomicBool,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn open(&self) -> Result<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(RpcError::transport(TransportErrorKind::AlreadyOpen, "already open"));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }

    async fn write(&self, _data: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(RpcError::transport(TransportErrorKind::NotOpen, "transport closed"));
        }
        Ok(())
    }

    async fn read_exact(&self, _buf: &mut [u8]) -> Result<()> {
        Err(RpcError::transport(TransportErrorKind::EndOfFile, "nothing to read"))
    }
}

#[derive(Default)]
pub struct RecordingTransportFactory {
    pub stats: Arc<TransportStats>,
    pub endpoints: std::sync::Mutex<Vec<(Endpoint, Duration)>>,
}

impl TransportFactory for RecordingTransportFactory {
    fn name(&self) -> &str {
        "recording"
    }

    fn build(&self, endpoint: &Endpoint, rpc_timeout: Duration) -> Result<SharedTransport> {
        self.stats.built.fetch_add(1, Ordering::SeqCst);
        self.endpoints
            .lock()
            .unwrap()
            .push((endpoint.clone(), rpc_timeout));

        Ok(Arc::new(RecordingTransport {
            stats: self.stats.clone(),
            open: AtomicBool::new(false),
        }))
    }
}

// ============================================================================
// Service
// ============================================================================

/// Methods of the generated calculator client.
pub const CALCULATOR_METHODS: [&str; 13] = [
    "send_add",
    "recv_add",
    "send_echo",
    "recv_echo",
    "send_sleep",
    "recv_sleep",
    "send_explode",
    "recv_explode",
    "send_ping",
    "recv_ping",
    "send_message",
    "send_oneway_message",
    "send_message_args",
];

pub struct Calculator;

impl ServiceDescription for Calculator {
    fn name(&self) -> &str {
        "Calculator"
    }

    fn methods(&self) -> Vec<String> {
        CALCULATOR_METHODS.iter().map(|m| m.to_string()).collect()
    }

    fn client(&self, protocol: Arc<dyn Protocol>) -> Arc<dyn ServiceClient> {
        Arc::new(CalculatorClient { protocol })
    }
}

/// Calculator over a protocol: refuses to work on a closed transport.
pub struct CalculatorClient {
    protocol: Arc<dyn Protocol>,
}

#[async_trait]
impl ServiceClient for CalculatorClient {
    async fn call(&self, name: &str, args: Vec<Value>) -> Result<RpcResult> {
        if !self.protocol.transport().is_open() {
            return Err(RpcError::transport(TransportErrorKind::NotOpen, "transport closed"));
        }
        calculate(name, args).await
    }
}

/// Calculator running in-process.
pub struct LocalCalculator;

#[async_trait]
impl ServiceClient for LocalCalculator {
    async fn call(&self, name: &str, args: Vec<Value>) -> Result<RpcResult> {
        calculate(name, args).await
    }
}

pub async fn calculate(name: &str, args: Vec<Value>) -> Result<RpcResult> {
    match name {
        "add" => Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>())),
        "echo" => Ok(Value::Array(args)),
        "sleep" => {
            let millis = args.first().and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(json!(millis))
        }
        "explode" => Err(RpcError::service("Explosion", "kaboom")),
        "ping" => Ok(json!("pong")),
        other => Err(RpcError::application(
            ferrule_common::ApplicationErrorKind::UnknownMethod,
            format!("unknown method {}", other),
        )),
    }
}

// ============================================================================
// Calculator over a socket
// ============================================================================

/// Calculator whose generated client talks to a [`spawn_calculator_server`]
/// through the configured protocol.
pub struct RemoteCalculator;

impl ServiceDescription for RemoteCalculator {
    fn name(&self) -> &str {
        "RemoteCalculator"
    }

    fn methods(&self) -> Vec<String> {
        CALCULATOR_METHODS.iter().map(|m| m.to_string()).collect()
    }

    fn client(&self, protocol: Arc<dyn Protocol>) -> Arc<dyn ServiceClient> {
        Arc::new(RemoteCalculatorClient { protocol })
    }
}

struct RemoteCalculatorClient {
    protocol: Arc<dyn Protocol>,
}

#[async_trait]
impl ServiceClient for RemoteCalculatorClient {
    async fn call(&self, name: &str, args: Vec<Value>) -> Result<RpcResult> {
        let request = serde_json::to_vec(&Rpc::new(name, args))
            .map_err(|e| RpcError::protocol(ProtocolErrorKind::InvalidData, e.to_string()))?;
        self.protocol.send_message(&request).await?;

        let reply = self.protocol.receive_message().await?;
        let reply: Value = serde_json::from_slice(&reply)
            .map_err(|e| RpcError::protocol(ProtocolErrorKind::InvalidData, e.to_string()))?;

        match reply.get("error").and_then(Value::as_str) {
            Some(message) => Err(RpcError::service("RemoteError", message)),
            None => Ok(reply.get("result").cloned().unwrap_or(Value::Null)),
        }
    }
}

/// Serves the calculator on a local port. Returns the port and a count of
/// accepted connections.
pub async fn spawn_calculator_server() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));

    let accepted = connections.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_connection(socket));
        }
    });

    (port, connections)
}

async fn serve_connection(mut socket: TcpStream) {
    loop {
        let mut len_buf = [0u8; 4];
        if socket.read_exact(&mut len_buf).await.is_err() {
            return;
        }
        let mut data = vec![0u8; u32::from_be_bytes(len_buf) as usize];
        if socket.read_exact(&mut data).await.is_err() {
            return;
        }

        let reply = match serde_json::from_slice::<Rpc>(&data) {
            Ok(rpc) => match calculate(&rpc.name, rpc.args).await {
                Ok(result) => json!({ "result": result }),
                Err(err) => json!({ "error": err.to_string() }),
            },
            Err(err) => json!({ "error": err.to_string() }),
        };

        let reply = serde_json::to_vec(&reply).unwrap();
        let len = (reply.len() as u32).to_be_bytes();
        if socket.write_all(&len).await.is_err() || socket.write_all(&reply).await.is_err() {
            return;
        }
    }
}

// ============================================================================
// Flaky implementation
// ============================================================================

/// Fails the first `failures` calls with `error()`, then succeeds with
/// `"ok"`.
pub struct Flaky {
    remaining: AtomicUsize,
    error: fn() -> RpcError,
    pub calls: AtomicUsize,
}

impl Flaky {
    pub fn new(failures: usize, error: fn() -> RpcError) -> Self {
        Self {
            remaining: AtomicUsize::new(failures),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(error: fn() -> RpcError) -> Self {
        Self::new(usize::MAX, error)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceClient for Flaky {
    async fn call(&self, _name: &str, _args: Vec<Value>) -> Result<RpcResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if failing {
            Err((self.error)())
        } else {
            Ok(json!("ok"))
        }
    }
}
