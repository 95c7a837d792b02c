//! Session client for a background worker.
//!
//! [`WorkerLinkClient`] owns the transport, the codec, the listener registry,
//! the heartbeat timer and the session flags. Everything runs on the caller's
//! task: public methods mutate state synchronously, and [`step`] waits for the
//! next discrete wake-up (an inbound payload or a heartbeat tick) and handles
//! it before returning. Nothing else touches the session in between.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = connect_to_worker();
//! let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default())?;
//!
//! client.on("connected", Listener::body(|_| {
//!     tracing::info!("worker accepted the session");
//!     Ok(())
//! }))?;
//! client.on_event("progress", Listener::envelope(|env| {
//!     println!("progress: {:?}", env.body);
//!     Ok(())
//! }))?;
//!
//! // Drive the session until the worker disconnects.
//! client.run().await?;
//! ```
//!
//! [`step`]: WorkerLinkClient::step

use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, WorkerLinkError};
use crate::heartbeat::{self, Heartbeat};
use crate::protocol::{self, Envelope};
use crate::registry::{Category, Listener, ListenerRegistry};
use crate::transport::Transport;

/// Default interval between heartbeat envelopes.
const DEFAULT_HEARTBEAT_RATE: Duration = Duration::from_millis(1000);

/// Lower bound for the heartbeat interval.
const MIN_HEARTBEAT_RATE: Duration = Duration::from_millis(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`WorkerLinkClient`].
///
/// # Example
///
/// ```
/// use worker_link::client::WorkerLinkConfig;
/// use std::time::Duration;
///
/// let config = WorkerLinkConfig::new()
///     .with_heartbeat_rate(Duration::from_millis(250))
///     .with_auto_listen(false);
/// assert_eq!(config.heartbeat_rate, Duration::from_millis(250));
/// assert!(!config.auto_listen);
/// ```
#[derive(Debug, Clone)]
pub struct WorkerLinkConfig {
    /// Interval between heartbeat envelopes while listening.
    ///
    /// Defaults to **1000 ms**. Values are clamped to the range 1 ms ..= 24 h.
    pub heartbeat_rate: Duration,
    /// Start listening as part of construction.
    ///
    /// Defaults to **true**.
    pub auto_listen: bool,
}

impl WorkerLinkConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            heartbeat_rate: DEFAULT_HEARTBEAT_RATE,
            auto_listen: true,
        }
    }

    /// Set the heartbeat interval.
    ///
    /// Defaults to **1000 ms**. Values are clamped to the range 1 ms ..= 24 h.
    #[must_use]
    pub fn with_heartbeat_rate(mut self, rate: Duration) -> Self {
        self.heartbeat_rate = clamp_heartbeat_rate(rate);
        self
    }

    /// Choose whether construction starts listening immediately.
    #[must_use]
    pub fn with_auto_listen(mut self, auto_listen: bool) -> Self {
        self.auto_listen = auto_listen;
        self
    }
}

fn clamp_heartbeat_rate(rate: Duration) -> Duration {
    rate.clamp(MIN_HEARTBEAT_RATE, heartbeat::MAX_RATE)
}

impl Default for WorkerLinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Snapshot of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not listening.
    Idle,
    /// Listening, waiting for the worker's `connected`.
    ListeningDisconnected,
    /// Listening and acknowledged by the worker.
    ListeningConnected,
}

/// Flags and timer owned by the client.
#[derive(Debug)]
struct Session {
    listening: bool,
    connected: bool,
    heartbeat: Heartbeat,
}

impl Session {
    fn new(heartbeat_rate: Duration) -> Self {
        Self {
            listening: false,
            connected: false,
            heartbeat: Heartbeat::new(heartbeat_rate),
        }
    }

    fn state(&self) -> SessionState {
        match (self.listening, self.connected) {
            (false, _) => SessionState::Idle,
            (true, false) => SessionState::ListeningDisconnected,
            (true, true) => SessionState::ListeningConnected,
        }
    }
}

/// What a call to [`WorkerLinkClient::step`] handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An inbound payload was dispatched (or dropped as malformed).
    Dispatched,
    /// A heartbeat envelope was sent.
    Heartbeat,
    /// The transport's inbound stream ended; the session was stopped.
    Closed,
    /// The client is not listening; nothing was awaited.
    Idle,
}

enum Wake {
    Tick,
    Inbound(Option<Result<String>>),
}

// ── Client ──────────────────────────────────────────────────────────

/// Connection-lifecycle and dispatch client for one worker channel.
pub struct WorkerLinkClient<T, C = JsonCodec> {
    transport: T,
    codec: C,
    listeners: ListenerRegistry,
    session: Session,
}

impl<T: Transport> WorkerLinkClient<T, JsonCodec> {
    /// Create a client using the JSON codec.
    ///
    /// Starts listening immediately when `config.auto_listen` is set, which
    /// sends one `connect` envelope and arms the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::InvalidTransport`] if the transport has no
    /// controller, or any error from [`start`](Self::start) when auto-listening.
    pub fn new(transport: T, config: WorkerLinkConfig) -> Result<Self> {
        Self::with_codec(transport, JsonCodec, config)
    }
}

impl<T: Transport, C: Codec> WorkerLinkClient<T, C> {
    /// Create a client with a custom codec.
    ///
    /// # Errors
    ///
    /// Same as [`new`](WorkerLinkClient::new).
    pub fn with_codec(transport: T, codec: C, config: WorkerLinkConfig) -> Result<Self> {
        if !transport.has_controller() {
            return Err(WorkerLinkError::InvalidTransport);
        }
        let mut client = Self {
            transport,
            codec,
            listeners: ListenerRegistry::new(),
            session: Session::new(clamp_heartbeat_rate(config.heartbeat_rate)),
        };
        if config.auto_listen {
            client.start()?;
        }
        Ok(client)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start listening: subscribe to the transport, send `connect` and arm the
    /// heartbeat.
    ///
    /// The `connect` envelope is fire-and-forget; the session only becomes
    /// connected once the worker answers with `connected`. If sending it
    /// fails the subscription is undone and the client stays idle.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::AlreadyListening`] if already listening,
    /// or the send error for the `connect` envelope.
    pub fn start(&mut self) -> Result<()> {
        if self.session.listening {
            return Err(WorkerLinkError::AlreadyListening);
        }
        self.session.listening = true;
        self.transport.subscribe();

        if let Err(e) = self.send(&Envelope::new(protocol::CONNECT)) {
            warn!("failed to send connect: {e}");
            self.session.listening = false;
            self.transport.unsubscribe();
            return Err(e);
        }
        if let Err(e) = self.session.heartbeat.start() {
            error!("heartbeat timer leaked across sessions: {e}");
            self.session.listening = false;
            self.transport.unsubscribe();
            return Err(e);
        }

        debug!("client listening");
        Ok(())
    }

    /// Stop listening: unsubscribe from the transport and cancel the heartbeat.
    ///
    /// Always clears the `connected` flag.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::NotListening`] if not listening.
    pub fn stop(&mut self) -> Result<()> {
        if !self.session.listening {
            return Err(WorkerLinkError::NotListening);
        }
        self.session.listening = false;
        self.session.connected = false;
        self.transport.unsubscribe();
        self.session.heartbeat.stop();
        debug!("client stopped");
        Ok(())
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Encode `envelope` and post it to the worker.
    ///
    /// No acknowledgement is awaited and nothing is retried. Session state is
    /// never changed by a send, successful or not.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::Encoding`] if the codec rejects the
    /// envelope, or whatever the transport's post primitive returns.
    pub fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let raw = self.codec.encode(envelope)?;
        self.transport.post_message(raw)
    }

    /// Send one `heartbeat` envelope.
    ///
    /// # Errors
    ///
    /// Propagates any [`send`](Self::send) failure.
    pub fn do_heartbeat(&mut self) -> Result<()> {
        trace!("sending heartbeat");
        self.send(&Envelope::new(protocol::HEARTBEAT))
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register `listener` under a category given by name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::InvalidCategory`] unless `category` is one
    /// of `message`, `disconnected`, `connected` or `event`.
    pub fn on(&mut self, category: &str, listener: Listener) -> Result<()> {
        let category = category.parse::<Category>()?;
        self.on_category(category, listener);
        Ok(())
    }

    /// Register `listener` under a typed category.
    pub fn on_category(&mut self, category: Category, listener: Listener) {
        self.listeners.add(category, listener);
    }

    /// Register `listener` for envelopes of exactly `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::InvalidEventType`] if `event_type` is empty.
    pub fn on_event(&mut self, event_type: &str, listener: Listener) -> Result<()> {
        self.listeners.add_for_type(event_type, listener)
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Decode one raw payload and route it.
    ///
    /// - malformed payloads are logged and dropped
    /// - `connected` / `disconnected` drive the session and fire only their
    ///   own category; `connected` is ignored while not listening
    /// - anything else fires `event` listeners, then `message` listeners,
    ///   then listeners registered for its type
    ///
    /// # Errors
    ///
    /// Returns the first listener failure, or
    /// [`WorkerLinkError::NotListening`] if a `disconnected` envelope
    /// arrives while the client is not listening.
    pub fn dispatch(&mut self, raw: &str) -> Result<()> {
        let Some(envelope) = self.codec.decode(raw) else {
            warn!("client got a malformed message");
            return Ok(());
        };

        match envelope.kind.as_str() {
            protocol::DISCONNECTED => self.handle_disconnected(&envelope),
            protocol::CONNECTED => self.handle_connected(&envelope),
            _ => {
                self.listeners.fire(Category::Event, &envelope)?;
                self.listeners.fire(Category::Message, &envelope)?;
                self.listeners.fire_for_type(&envelope)
            }
        }
    }

    fn handle_connected(&mut self, envelope: &Envelope) -> Result<()> {
        if !self.session.listening {
            warn!("ignoring connected envelope while not listening");
            return Ok(());
        }
        self.session.connected = true;
        debug!("worker connected");
        self.listeners.fire(Category::Connected, envelope)
    }

    fn handle_disconnected(&mut self, envelope: &Envelope) -> Result<()> {
        self.session.connected = false;
        if let Err(e) = self.stop() {
            error!("disconnect received while not listening: {e}");
            return Err(e);
        }
        debug!("worker disconnected");
        self.listeners.fire(Category::Disconnected, envelope)
    }

    // ── Driver ──────────────────────────────────────────────────────

    /// Wait for the next heartbeat tick or inbound payload and handle it.
    ///
    /// Returns [`Step::Idle`] immediately when not listening. When the
    /// transport's inbound stream ends the client runs the disconnect
    /// sequence without a body and returns [`Step::Closed`].
    ///
    /// # Errors
    ///
    /// Returns heartbeat send failures, transport receive errors and any
    /// error from [`dispatch`](Self::dispatch).
    pub async fn step(&mut self) -> Result<Step> {
        if !self.session.listening {
            return Ok(Step::Idle);
        }

        let wake = tokio::select! {
            () = self.session.heartbeat.tick() => Wake::Tick,
            incoming = self.transport.recv() => Wake::Inbound(incoming),
        };

        match wake {
            Wake::Tick => {
                self.do_heartbeat()?;
                Ok(Step::Heartbeat)
            }
            Wake::Inbound(Some(Ok(raw))) => {
                self.dispatch(&raw)?;
                Ok(Step::Dispatched)
            }
            Wake::Inbound(Some(Err(e))) => {
                warn!("transport receive error: {e}");
                Err(e)
            }
            Wake::Inbound(None) => {
                debug!("transport closed while listening");
                self.handle_disconnected(&Envelope::new(protocol::DISCONNECTED))?;
                Ok(Step::Closed)
            }
        }
    }

    /// Call [`step`](Self::step) until the client stops listening.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`step`](Self::step).
    pub async fn run(&mut self) -> Result<()> {
        while self.session.listening {
            self.step().await?;
        }
        Ok(())
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while subscribed to the transport.
    pub fn is_listening(&self) -> bool {
        self.session.listening
    }

    /// Returns `true` once the worker has sent `connected`, until the session
    /// stops or the worker sends `disconnected`.
    pub fn is_connected(&self) -> bool {
        self.session.connected
    }

    /// Returns `true` while the heartbeat timer is armed.
    pub fn is_heartbeat_running(&self) -> bool {
        self.session.heartbeat.is_running()
    }

    /// Current state machine position.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Interval between heartbeat envelopes.
    pub fn heartbeat_rate(&self) -> Duration {
        self.session.heartbeat.rate()
    }

    /// Read-only access to the registered listeners.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Shared access to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T, C> std::fmt::Debug for WorkerLinkClient<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLinkClient")
            .field("listening", &self.session.listening)
            .field("connected", &self.session.connected)
            .field("heartbeat_running", &self.session.heartbeat.is_running())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    // ── Mock transport ──────────────────────────────────────────────

    /// Records posted messages and replays scripted inbound payloads.
    struct MockTransport {
        controller: bool,
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        subscribed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<Result<String>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let subscribed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                controller: true,
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                subscribed: Arc::clone(&subscribed),
            };
            (transport, sent, subscribed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn has_controller(&self) -> bool {
            self.controller
        }

        fn subscribe(&mut self) {
            self.subscribed.store(true, Ordering::Relaxed);
        }

        fn unsubscribe(&mut self) {
            self.subscribed.store(false, Ordering::Relaxed);
        }

        fn post_message(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }
    }

    fn types_sent(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<String> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str::<Envelope>(raw).unwrap().kind)
            .collect()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = WorkerLinkConfig::default();
        assert_eq!(config.heartbeat_rate, Duration::from_millis(1000));
        assert!(config.auto_listen);
    }

    #[test]
    fn heartbeat_rate_is_clamped() {
        let config = WorkerLinkConfig::new().with_heartbeat_rate(Duration::ZERO);
        assert_eq!(config.heartbeat_rate, Duration::from_millis(1));
    }

    #[test]
    fn missing_controller_is_rejected() {
        let (mut transport, sent, _subscribed) = MockTransport::new(vec![]);
        transport.controller = false;
        let err = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap_err();
        assert!(matches!(err, WorkerLinkError::InvalidTransport));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn auto_listen_sends_connect() {
        let (transport, sent, subscribed) = MockTransport::new(vec![]);
        let client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();

        assert_eq!(client.state(), SessionState::ListeningDisconnected);
        assert!(client.is_heartbeat_running());
        assert!(subscribed.load(Ordering::Relaxed));
        assert_eq!(types_sent(&sent), vec!["connect"]);
    }

    #[test]
    fn stop_clears_connected() {
        let (transport, _sent, subscribed) = MockTransport::new(vec![]);
        let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();
        client.dispatch(r#"{"type":"connected"}"#).unwrap();
        assert!(client.is_connected());

        client.stop().unwrap();
        assert_eq!(client.state(), SessionState::Idle);
        assert!(!client.is_connected());
        assert!(!client.is_heartbeat_running());
        assert!(!subscribed.load(Ordering::Relaxed));
    }

    #[test]
    fn disconnected_while_idle_is_a_protocol_violation() {
        let (transport, _sent, _subscribed) = MockTransport::new(vec![]);
        let config = WorkerLinkConfig::new().with_auto_listen(false);
        let mut client = WorkerLinkClient::new(transport, config).unwrap();

        let err = client.dispatch(r#"{"type":"disconnected"}"#).unwrap_err();
        assert!(matches!(err, WorkerLinkError::NotListening));
    }

    #[tokio::test(start_paused = true)]
    async fn step_is_idle_when_not_listening() {
        let (transport, _sent, _subscribed) = MockTransport::new(vec![]);
        let config = WorkerLinkConfig::new().with_auto_listen(false);
        let mut client = WorkerLinkClient::new(transport, config).unwrap();

        assert_eq!(client.step().await.unwrap(), Step::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn step_dispatches_scripted_messages_in_order() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let (transport, _sent, _subscribed) = MockTransport::new(vec![
            Some(Ok(r#"{"type":"connected"}"#.into())),
            Some(Ok(r#"{"type":"a","body":1}"#.into())),
            Some(Ok(r#"{"type":"b","body":2}"#.into())),
        ]);
        let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();
        {
            let seen = Arc::clone(&seen);
            client.on_category(
                Category::Message,
                Listener::body(move |body| {
                    seen.lock().unwrap().push(body.cloned());
                    Ok(())
                }),
            );
        }

        for _ in 0..3 {
            assert_eq!(client.step().await.unwrap(), Step::Dispatched);
        }
        assert!(client.is_connected());
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1)), Some(json!(2))]);
    }

    #[tokio::test(start_paused = true)]
    async fn step_sends_heartbeat_when_channel_is_quiet() {
        let (transport, sent, _subscribed) = MockTransport::new(vec![]);
        let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();

        assert_eq!(client.step().await.unwrap(), Step::Heartbeat);
        assert_eq!(types_sent(&sent), vec!["connect", "heartbeat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_transport_stops_session() {
        let (transport, _sent, subscribed) =
            MockTransport::new(vec![Some(Ok(r#"{"type":"connected"}"#.into())), None]);
        let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        {
            let fired = Arc::clone(&fired);
            client.on_category(
                Category::Disconnected,
                Listener::body(move |body| {
                    assert!(body.is_none());
                    fired.store(true, Ordering::Relaxed);
                    Ok(())
                }),
            );
        }

        client.run().await.unwrap();
        assert_eq!(client.state(), SessionState::Idle);
        assert!(!subscribed.load(Ordering::Relaxed));
        assert!(fired.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_is_returned_without_state_change() {
        let (transport, _sent, _subscribed) = MockTransport::new(vec![Some(Err(
            WorkerLinkError::TransportReceive("boom".into()),
        ))]);
        let mut client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();

        let err = client.step().await.unwrap_err();
        assert!(matches!(err, WorkerLinkError::TransportReceive(ref m) if m == "boom"));
        assert_eq!(client.state(), SessionState::ListeningDisconnected);
    }

    #[test]
    fn debug_does_not_require_debug_transport() {
        let (transport, _sent, _subscribed) = MockTransport::new(vec![]);
        let client = WorkerLinkClient::new(transport, WorkerLinkConfig::default()).unwrap();
        let text = format!("{client:?}");
        assert!(text.contains("listening: true"));
    }
}
