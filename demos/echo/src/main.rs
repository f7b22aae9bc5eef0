//! # Ferrule Echo Demo
//!
//! Runs an in-process echo service behind a ferrule client and prints the
//! collected metrics as JSON. Every `--fail-every`th call fails with a
//! transport error, so the retry proxy and the error metrics have work to do.
//!
//! ## Usage
//!
//! ```bash
//! # 50 calls, 8 at a time, every 4th attempt failing
//! ferrule-echo --calls 50 --concurrency 8 --fail-every 4
//!
//! # Apply client settings from JSON
//! ferrule-echo --settings '{"pool_size": "2", "pool_timeout": 0.5}'
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use async_trait::async_trait;
use ferrule_client::{
    rpc_client, ClientClass, ClientSettings, ErrorWrapping, Ping, RetryOptions, Validation,
};
use ferrule_common::{
    Protocol, ProtocolErrorKind, RpcError, RpcResult, ServiceClient, ServiceDescription,
    TransportErrorKind,
};
use ferrule_metrics::MetricsRegistry;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(FromArgs)]
/// Exercise a ferrule client against an in-process echo service
struct Args {
    /// number of calls to make
    #[argh(option, default = "20")]
    calls: u64,

    /// number of calls in flight at once
    #[argh(option, default = "4")]
    concurrency: u64,

    /// fail every Nth attempt with a transport error (0 disables)
    #[argh(option, default = "3")]
    fail_every: u64,

    /// attempts per call
    #[argh(option, default = "5")]
    tries: u32,

    /// pause between attempts in milliseconds
    #[argh(option, default = "10")]
    interval_ms: u64,

    /// client settings as JSON, e.g. '{"pool_size": 2}'
    #[argh(option)]
    settings: Option<String>,
}

rpc_client! {
    /// Typed echo client.
    struct EchoClient {
        fn echo(message);
        fn ping();
    }
}

/// Echo implementation failing every `fail_every`th attempt.
struct Echo {
    attempts: AtomicU64,
    fail_every: u64,
}

#[async_trait]
impl ServiceClient for Echo {
    async fn call(&self, name: &str, args: Vec<Value>) -> ferrule_common::Result<RpcResult> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && attempt % self.fail_every == 0 {
            return Err(RpcError::transport(
                TransportErrorKind::EndOfFile,
                format!("connection dropped on attempt {}", attempt),
            ));
        }

        match name {
            "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
            "ping" => Ok(json!("pong")),
            other => Err(RpcError::service("UnknownOperation", other)),
        }
    }
}

struct EchoService {
    implementation: Arc<Echo>,
}

impl ServiceDescription for EchoService {
    fn name(&self) -> &str {
        "Echo"
    }

    fn methods(&self) -> Vec<String> {
        ["send_echo", "recv_echo", "send_ping", "recv_ping", "send_message"]
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    fn client(&self, _protocol: Arc<dyn Protocol>) -> Arc<dyn ServiceClient> {
        self.implementation.clone()
    }
}

/// Messages must carry a non-empty `text`.
fn validate_message(value: &Value) -> ferrule_common::Result<()> {
    match value.get("text").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => Ok(()),
        _ => Err(RpcError::protocol(
            ProtocolErrorKind::InvalidData,
            "Required field text is unset!",
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let implementation = Arc::new(Echo {
        attempts: AtomicU64::new(0),
        fail_every: args.fail_every,
    });
    let registry = Arc::new(MetricsRegistry::new());

    let class = ClientClass::build_with(
        Arc::new(EchoService {
            implementation: implementation.clone(),
        }),
        |class| {
            class.configure(|config| config.statsd = registry.clone());
            class.use_middleware(ErrorWrapping::new())?;
            class.use_middleware(Validation::new(validate_message))
        },
    )?;

    if let Some(settings) = &args.settings {
        let settings = ClientSettings::from_json(settings)?;
        class.configure(|config| config.apply(&settings))?;
    }

    tracing::info!(config = ?class.config(), rpcs = ?class.rpcs(), "Client class ready");

    let client = class.direct(implementation.clone())?;
    if !client.up().await {
        tracing::info!("First ping failed, the retry proxy will take over");
    }

    let echo = EchoClient::new(client.with_retry(
        RetryOptions::default()
            .tries(args.tries)
            .interval(Duration::from_millis(args.interval_ms)),
    ));

    let mut failures = 0;
    let concurrency = args.concurrency.max(1);
    let mut sent = 0;
    while sent < args.calls {
        let batch = concurrency.min(args.calls - sent);
        let calls = (sent..sent + batch).map(|i| {
            let echo = echo.clone();
            async move { echo.echo(json!({ "text": format!("message {}", i) })).await }
        });

        for result in futures::future::join_all(calls).await {
            if let Err(err) = result {
                failures += 1;
                tracing::warn!(error = %err, "Call failed");
            }
        }
        sent += batch;
    }

    // A message the validator rejects before it reaches the service
    if let Err(err) = echo.echo(json!({ "text": "" })).await {
        tracing::info!(error = %err, "Invalid message rejected");
    }

    tracing::info!(
        calls = args.calls,
        failures,
        attempts = implementation.attempts.load(Ordering::SeqCst),
        "Done"
    );

    let snapshot = registry.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize metrics")?
    );

    Ok(())
}
