//! # Worker Link
//!
//! Connection-lifecycle and message-dispatch client for a single
//! postMessage-style channel to a long-lived background worker.
//!
//! The channel itself is connectionless. This crate layers a logical session
//! on top of it: the client announces itself with `connect`, the worker
//! answers `connected`, the client keeps the session alive with periodic
//! `heartbeat`s, and either side can end it (`disconnected` from the worker,
//! [`stop`](WorkerLinkClient::stop) from the client).
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any channel
//! - **Pluggable codec** — [`JsonCodec`] by default, or bring your own [`Codec`]
//! - **Listener registries** — fixed lifecycle [`Category`] buckets plus
//!   open-ended event types
//! - **Cooperative** — one owned client, driven by [`WorkerLinkClient::step`]
//!   or [`WorkerLinkClient::run`]; no locks, no background tasks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use worker_link::{Listener, WorkerLinkClient, WorkerLinkConfig};
//!
//! let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default())?;
//! client.on("message", Listener::body(|body| {
//!     println!("worker said {body:?}");
//!     Ok(())
//! }))?;
//! client.run().await?;
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod transport;

// Re-export primary types for ergonomic imports.
pub use client::{SessionState, Step, WorkerLinkClient, WorkerLinkConfig};
pub use codec::{Codec, JsonCodec};
pub use error::{Result, WorkerLinkError};
pub use protocol::Envelope;
pub use registry::{Category, Listener, ListenerRegistry, ListenerResult};
pub use transport::Transport;
