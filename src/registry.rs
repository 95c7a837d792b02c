//! Listener registries.
//!
//! Two independent structures live here:
//!
//! - four fixed [`Category`] lists, fired by the client's dispatch routine
//! - an open map from application event type to listeners, created lazily
//!   on first registration
//!
//! Both are append-only. Listeners fire in registration order. A failing
//! listener stops its batch: the error is returned to whoever triggered the
//! dispatch and later listeners in that batch do not run.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BoxError, Result, WorkerLinkError};
use crate::protocol::Envelope;

/// Return type of every listener.
pub type ListenerResult = std::result::Result<(), BoxError>;

type BodyFn = Box<dyn FnMut(Option<&Value>) -> ListenerResult + Send>;
type EnvelopeFn = Box<dyn FnMut(&Envelope) -> ListenerResult + Send>;

// ── Category ────────────────────────────────────────────────────────

/// The fixed set of lifecycle listener buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Every non-lifecycle envelope; conventionally observed via its body.
    Message,
    /// The worker ended the session.
    Disconnected,
    /// The worker accepted the session.
    Connected,
    /// Every non-lifecycle envelope; conventionally observed in full.
    Event,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Category; 4] = [
        Category::Message,
        Category::Disconnected,
        Category::Connected,
        Category::Event,
    ];

    /// The category's wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = WorkerLinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| WorkerLinkError::InvalidCategory(s.to_owned()))
    }
}

// ── Listener ────────────────────────────────────────────────────────

/// A registered callback.
///
/// The variant decides what the callback sees when it fires: a body listener
/// gets the envelope's body, an envelope listener gets the whole envelope.
pub enum Listener {
    /// Receives `envelope.body`.
    Body(BodyFn),
    /// Receives the full envelope.
    Envelope(EnvelopeFn),
}

impl Listener {
    /// Wrap a callback that receives the envelope body.
    pub fn body<F>(f: F) -> Self
    where
        F: FnMut(Option<&Value>) -> ListenerResult + Send + 'static,
    {
        Self::Body(Box::new(f))
    }

    /// Wrap a callback that receives the full envelope.
    pub fn envelope<F>(f: F) -> Self
    where
        F: FnMut(&Envelope) -> ListenerResult + Send + 'static,
    {
        Self::Envelope(Box::new(f))
    }

    fn call(&mut self, envelope: &Envelope) -> ListenerResult {
        match self {
            Self::Body(f) => f(envelope.body.as_ref()),
            Self::Envelope(f) => f(envelope),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body(_) => f.write_str("Listener::Body(..)"),
            Self::Envelope(_) => f.write_str("Listener::Envelope(..)"),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Category lists plus the open event-type map.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    message: Vec<Listener>,
    disconnected: Vec<Listener>,
    connected: Vec<Listener>,
    event: Vec<Listener>,
    by_type: HashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` to `category`.
    pub fn add(&mut self, category: Category, listener: Listener) {
        self.list_mut(category).push(listener);
    }

    /// Append `listener` to the list for `event_type`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::InvalidEventType`] if `event_type` is empty.
    pub fn add_for_type(&mut self, event_type: &str, listener: Listener) -> Result<()> {
        if event_type.is_empty() {
            return Err(WorkerLinkError::InvalidEventType);
        }
        self.by_type
            .entry(event_type.to_owned())
            .or_default()
            .push(listener);
        Ok(())
    }

    /// Number of listeners registered under `category`.
    pub fn len(&self, category: Category) -> usize {
        self.list(category).len()
    }

    /// Number of listeners registered for `event_type`.
    pub fn len_for_type(&self, event_type: &str) -> usize {
        self.by_type.get(event_type).map_or(0, Vec::len)
    }

    /// Fire every listener in `category` with `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::Listener`] for the first failing listener.
    pub fn fire(&mut self, category: Category, envelope: &Envelope) -> Result<()> {
        fire_all(self.list_mut(category), category.as_str(), envelope)
    }

    /// Fire every listener registered for `envelope.kind`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::Listener`] for the first failing listener.
    pub fn fire_for_type(&mut self, envelope: &Envelope) -> Result<()> {
        match self.by_type.get_mut(&envelope.kind) {
            Some(listeners) => fire_all(listeners, &envelope.kind, envelope),
            None => Ok(()),
        }
    }

    fn list(&self, category: Category) -> &Vec<Listener> {
        match category {
            Category::Message => &self.message,
            Category::Disconnected => &self.disconnected,
            Category::Connected => &self.connected,
            Category::Event => &self.event,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<Listener> {
        match category {
            Category::Message => &mut self.message,
            Category::Disconnected => &mut self.disconnected,
            Category::Connected => &mut self.connected,
            Category::Event => &mut self.event,
        }
    }
}

fn fire_all(listeners: &mut [Listener], trigger: &str, envelope: &Envelope) -> Result<()> {
    for listener in listeners.iter_mut() {
        listener
            .call(envelope)
            .map_err(|source| WorkerLinkError::Listener {
                trigger: trigger.to_owned(),
                source,
            })?;
    }
    Ok(())
}

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
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |tag: &str| {
                let log = Arc::clone(&log);
                let tag = tag.to_owned();
                Listener::envelope(move |_| {
                    log.lock().unwrap().push(tag.clone());
                    Ok(())
                })
            }
        };
        (log, make)
    }

    #[test]
    fn category_parses_fixed_names_only() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        let err = "Message".parse::<Category>().unwrap_err();
        assert!(matches!(err, WorkerLinkError::InvalidCategory(ref s) if s == "Message"));
        assert!("".parse::<Category>().is_err());
        assert!("heartbeat".parse::<Category>().is_err());
    }

    #[test]
    fn category_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Category::Event).unwrap(), r#""event""#);
        let c: Category = serde_json::from_str(r#""disconnected""#).unwrap();
        assert_eq!(c, Category::Disconnected);
    }

    #[test]
    fn listeners_fire_in_registration_order_once_each() {
        let (log, make) = recorder();
        let mut reg = ListenerRegistry::new();
        for tag in ["a", "b", "c", "d"] {
            reg.add(Category::Message, make(tag));
        }

        reg.fire(Category::Message, &Envelope::new("x")).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn categories_are_independent() {
        let (log, make) = recorder();
        let mut reg = ListenerRegistry::new();
        reg.add(Category::Connected, make("connected"));
        reg.add(Category::Event, make("event"));

        reg.fire(Category::Message, &Envelope::new("x")).unwrap();
        assert!(log.lock().unwrap().is_empty());

        reg.fire(Category::Connected, &Envelope::new("x")).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["connected"]);
    }

    #[test]
    fn body_and_envelope_listeners_see_their_shape() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ListenerRegistry::new();
        {
            let seen = Arc::clone(&seen);
            reg.add(
                Category::Message,
                Listener::body(move |body| {
                    seen.lock().unwrap().push(body.cloned());
                    Ok(())
                }),
            );
        }
        {
            let seen = Arc::clone(&seen);
            reg.add(
                Category::Message,
                Listener::envelope(move |env| {
                    seen.lock().unwrap().push(Some(json!(env.kind)));
                    Ok(())
                }),
            );
        }

        reg.fire(Category::Message, &Envelope::with_body("chat", json!(7)))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(7)), Some(json!("chat"))]);
    }

    #[test]
    fn event_type_lists_are_created_lazily() {
        let (log, make) = recorder();
        let mut reg = ListenerRegistry::new();
        assert_eq!(reg.len_for_type("foo"), 0);

        // Firing an unknown type is a no-op.
        reg.fire_for_type(&Envelope::new("foo")).unwrap();

        reg.add_for_type("foo", make("foo-1")).unwrap();
        reg.add_for_type("foo", make("foo-2")).unwrap();
        reg.add_for_type("bar", make("bar")).unwrap();
        assert_eq!(reg.len_for_type("foo"), 2);

        reg.fire_for_type(&Envelope::new("foo")).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["foo-1", "foo-2"]);
    }

    #[test]
    fn empty_event_type_is_rejected() {
        let (_log, make) = recorder();
        let mut reg = ListenerRegistry::new();
        let err = reg.add_for_type("", make("x")).unwrap_err();
        assert!(matches!(err, WorkerLinkError::InvalidEventType));
        assert_eq!(reg.len_for_type(""), 0);
    }

    #[test]
    fn failing_listener_stops_the_batch() {
        let (log, make) = recorder();
        let mut reg = ListenerRegistry::new();
        reg.add(Category::Event, make("first"));
        reg.add(
            Category::Event,
            Listener::envelope(|_| Err("boom".into())),
        );
        reg.add(Category::Event, make("never"));

        let err = reg.fire(Category::Event, &Envelope::new("x")).unwrap_err();
        match err {
            WorkerLinkError::Listener { trigger, source } => {
                assert_eq!(trigger, "event");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected Listener error, got {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }
}
