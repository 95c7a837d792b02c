//! # Loopback Worker Demo
//!
//! Runs a [`WorkerLinkClient`] against an in-process "worker" task connected
//! through a pair of unbounded channels. The worker accepts the session,
//! emits a few progress events, answers heartbeats, and finally disconnects.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_worker
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use worker_link::{
    Envelope, Listener, Transport, WorkerLinkClient, WorkerLinkConfig, WorkerLinkError,
};

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-backed transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
struct LoopbackTransport {
    /// Client → worker.
    tx: mpsc::UnboundedSender<String>,
    /// Worker → client.
    rx: mpsc::UnboundedReceiver<String>,
}

/// Worker half of the loopback.
struct LoopbackWorker {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackWorker) {
    let (client_tx, worker_rx) = mpsc::unbounded_channel();
    let (worker_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackWorker {
            rx: worker_rx,
            tx: worker_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn has_controller(&self) -> bool {
        !self.tx.is_closed()
    }

    fn subscribe(&mut self) {
        tracing::debug!("loopback: subscribed");
    }

    fn unsubscribe(&mut self) {
        tracing::debug!("loopback: unsubscribed");
    }

    fn post_message(&mut self, message: String) -> Result<(), WorkerLinkError> {
        self.tx
            .send(message)
            .map_err(|e| WorkerLinkError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, WorkerLinkError>> {
        self.rx.recv().await.map(Ok)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A scripted worker
// ─────────────────────────────────────────────────────────────────────

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn run_worker(mut worker: LoopbackWorker) -> Result<(), BoxError> {
    let mut heartbeats = 0;
    while let Some(raw) = worker.rx.recv().await {
        let envelope: Envelope = serde_json::from_str(&raw)?;
        match envelope.kind.as_str() {
            "connect" => {
                tracing::info!("worker: client connected");
                let connected = json!({"type": "connected", "body": {"version": 1}});
                worker.tx.send(connected.to_string())?;
                for step in 1..=3 {
                    let progress = json!({
                        "type": "progress",
                        "body": {"step": step, "of": 3}
                    });
                    worker.tx.send(progress.to_string())?;
                }
            }
            "heartbeat" => {
                heartbeats += 1;
                tracing::info!("worker: heartbeat #{heartbeats}");
                if heartbeats == 2 {
                    let bye = json!({"type": "disconnected", "body": "done"});
                    worker.tx.send(bye.to_string())?;
                }
            }
            other => tracing::info!("worker: got {other}"),
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire the client to the worker
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, worker) = loopback_pair();
    let worker_task = tokio::spawn(run_worker(worker));

    let config = WorkerLinkConfig::new().with_heartbeat_rate(Duration::from_millis(200));
    let mut client = WorkerLinkClient::new(transport, config)?;

    client.on(
        "connected",
        Listener::body(|body| {
            tracing::info!("client: session accepted ({body:?})");
            Ok(())
        }),
    )?;
    client.on_event(
        "progress",
        Listener::envelope(|env| {
            tracing::info!("client: progress {:?}", env.body);
            Ok(())
        }),
    )?;
    client.on(
        "disconnected",
        Listener::body(|body| {
            tracing::info!("client: worker ended the session ({body:?})");
            Ok(())
        }),
    )?;

    client.run().await?;
    tracing::info!("client: final state {:?}", client.state());

    // Dropping the client closes the worker's inbound channel.
    drop(client);
    worker_task.await??;
    Ok(())
}
