#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for worker-link integration tests.
//!
//! Provides a recording [`MockTransport`] and helpers for building raw
//! envelope payloads and recording listener calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use worker_link::{Envelope, Listener, Transport, WorkerLinkError};

// ── MockTransport ───────────────────────────────────────────────────

/// Shared handles for inspecting what a [`MockTransport`] saw.
#[derive(Clone, Default)]
pub struct MockHandles {
    /// Every payload posted by the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether the client is currently subscribed.
    pub subscribed: Arc<AtomicBool>,
    /// Make `post_message` fail while set.
    pub fail_posts: Arc<AtomicBool>,
}

impl MockHandles {
    /// Types of all posted envelopes, in order.
    pub fn sent_types(&self) -> Vec<String> {
        self.sent_envelopes().into_iter().map(|e| e.kind).collect()
    }

    /// All posted envelopes, in order.
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("client posted invalid JSON"))
            .collect()
    }

    /// Number of posted envelopes of the given type.
    pub fn count(&self, kind: &str) -> usize {
        self.sent_types().iter().filter(|k| *k == kind).count()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    pub fn set_fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::Release);
    }
}

/// A scripted mock transport for integration testing.
///
/// Scripted inbound payloads are consumed in order by `recv()`; once they run
/// out, `recv()` pends forever.
pub struct MockTransport {
    controller: bool,
    incoming: VecDeque<Option<Result<String, WorkerLinkError>>>,
    handles: MockHandles,
}

impl MockTransport {
    /// Create a transport with a controller and the given inbound script.
    pub fn new(incoming: Vec<Option<Result<String, WorkerLinkError>>>) -> (Self, MockHandles) {
        let handles = MockHandles::default();
        let transport = Self {
            controller: true,
            incoming: VecDeque::from(incoming),
            handles: handles.clone(),
        };
        (transport, handles)
    }

    /// Create a transport whose controller is missing.
    pub fn without_controller() -> (Self, MockHandles) {
        let (mut transport, handles) = Self::new(vec![]);
        transport.controller = false;
        (transport, handles)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn has_controller(&self) -> bool {
        self.controller
    }

    fn subscribe(&mut self) {
        self.handles.subscribed.store(true, Ordering::Release);
    }

    fn unsubscribe(&mut self) {
        self.handles.subscribed.store(false, Ordering::Release);
    }

    fn post_message(&mut self, message: String) -> Result<(), WorkerLinkError> {
        if self.handles.fail_posts.load(Ordering::Acquire) {
            return Err(WorkerLinkError::TransportSend("controller gone".into()));
        }
        self.handles.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WorkerLinkError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }
}

// ── Payload helpers ─────────────────────────────────────────────────

/// Raw payload for an envelope without a body.
pub fn raw(kind: &str) -> String {
    serde_json::to_string(&Envelope::new(kind)).expect("raw serialization")
}

/// Raw payload for an envelope with a body.
pub fn raw_with(kind: &str, body: Value) -> String {
    serde_json::to_string(&Envelope::with_body(kind, body)).expect("raw_with serialization")
}

// ── Listener recording ──────────────────────────────────────────────

/// One recorded listener call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// A body listener fired.
    Body(String, Option<Value>),
    /// An envelope listener fired.
    Envelope(String, Envelope),
}

/// Collects listener calls across categories, preserving global order.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<StdMutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A body listener that records under `tag`.
    pub fn body(&self, tag: &str) -> Listener {
        let calls = Arc::clone(&self.calls);
        let tag = tag.to_owned();
        Listener::body(move |body| {
            calls.lock().unwrap().push(Call::Body(tag.clone(), body.cloned()));
            Ok(())
        })
    }

    /// An envelope listener that records under `tag`.
    pub fn envelope(&self, tag: &str) -> Listener {
        let calls = Arc::clone(&self.calls);
        let tag = tag.to_owned();
        Listener::envelope(move |env| {
            calls
                .lock()
                .unwrap()
                .push(Call::Envelope(tag.clone(), env.clone()));
            Ok(())
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Tags of all recorded calls, in order.
    pub fn tags(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| match c {
                Call::Body(tag, _) | Call::Envelope(tag, _) => tag,
            })
            .collect()
    }
}
