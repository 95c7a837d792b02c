//! Error types for the worker-link client.

use thiserror::Error;

/// Boxed error returned by a failing listener.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when using the worker-link client.
#[derive(Debug, Error)]
pub enum WorkerLinkError {
    /// The transport has no controller to post to. No client is produced.
    #[error("invalid transport: worker controller is missing")]
    InvalidTransport,

    /// `start` was called while the client was already listening.
    #[error("client already listening")]
    AlreadyListening,

    /// `stop` was called (directly or by a disconnect) while not listening.
    #[error("client not listening")]
    NotListening,

    /// A listener was registered under a category outside the fixed set.
    #[error("invalid listener category: {0:?}")]
    InvalidCategory(String),

    /// A listener was registered under an empty event type.
    #[error("invalid event type: event types must be non-empty")]
    InvalidEventType,

    /// The heartbeat timer was started twice. Indicates a bug in the client.
    #[error("heartbeat already running")]
    HeartbeatAlreadyRunning,

    /// The codec could not encode an outbound envelope.
    #[error("encoding error: {reason}")]
    Encoding {
        /// What went wrong.
        reason: String,
        /// Underlying serializer error, if any.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The transport refused an outbound message.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// The transport failed while delivering an inbound message.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// A listener failed; later listeners in the same batch were not run.
    #[error("listener for {trigger:?} failed: {source}")]
    Listener {
        /// Category or event type whose batch was being dispatched.
        trigger: String,
        /// The listener's own error.
        #[source]
        source: BoxError,
    },
}

/// A specialized [`Result`] type for worker-link operations.
pub type Result<T> = std::result::Result<T, WorkerLinkError>;
