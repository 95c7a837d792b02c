//! Transport abstraction for the worker channel.
//!
//! The [`Transport`] trait models a postMessage-style channel: a synchronous
//! post primitive towards the worker's controller, a subscription toggle for
//! inbound messages, and a cancel-safe `recv` the client polls while it is
//! subscribed.
//!
//! # Connection Setup
//!
//! Locating the worker (or a platform default) is NOT part of this trait.
//! Construct the transport externally, then hand it to
//! `WorkerLinkClient::new`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use worker_link::error::WorkerLinkError;
//! use worker_link::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     fn has_controller(&self) -> bool {
//!         true
//!     }
//!
//!     fn subscribe(&mut self) {}
//!
//!     fn unsubscribe(&mut self) {}
//!
//!     fn post_message(&mut self, message: String) -> Result<(), WorkerLinkError> {
//!         // Hand the encoded envelope to the worker
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, WorkerLinkError>> {
//!         // Wait for the next raw payload from the worker
//!         // Return None when the channel is gone for good
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::WorkerLinkError;

/// A bidirectional message channel to a background worker.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic dispatch.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// client races it against the heartbeat timer inside `tokio::select!`.
/// Channel-based implementations (e.g. wrapping `mpsc::UnboundedReceiver`)
/// are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Returns `true` if there is a controller to post messages to.
    ///
    /// The client refuses transports without one.
    fn has_controller(&self) -> bool;

    /// Called when the client starts listening for inbound messages.
    fn subscribe(&mut self);

    /// Called when the client stops listening for inbound messages.
    fn unsubscribe(&mut self);

    /// Post one encoded message to the worker.
    ///
    /// Delivery is fire-and-forget: the call returns once the message has been
    /// handed off, without waiting for an acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::TransportSend`] if the channel is unavailable.
    fn post_message(&mut self, message: String) -> Result<(), WorkerLinkError>;

    /// Wait for the next raw inbound payload.
    ///
    /// Returns:
    /// - `Some(Ok(raw))` for a delivered payload
    /// - `Some(Err(e))` for a delivery failure (e.g. [`WorkerLinkError::TransportReceive`])
    /// - `None` once the channel is closed
    ///
    /// Only polled while subscribed.
    async fn recv(&mut self) -> Option<Result<String, WorkerLinkError>>;
}
