use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{NetworkError, RequestContext, Response, Result};

/// Lifecycle signals published by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A logical request begins, before its first attempt.
    Start,
    /// One attempt finished (success or failure).
    End,
    /// An attempt produced a response, whatever its status.
    Response,
    /// A logical request failed, or a chain rejection went unhandled.
    Error,
}

impl Event {
    /// Name of the event as used by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Response => "response",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = NetworkError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "response" => Ok(Self::Response),
            "error" => Ok(Self::Error),
            other => Err(NetworkError::Usage(format!("unknown event '{other}'"))),
        }
    }
}

/// Data handed to event handlers.
#[derive(Debug)]
pub enum EventPayload<'a> {
    /// Sent with [`Event::Start`].
    Request(&'a RequestContext),
    /// Sent with [`Event::End`]; `attempt` counts from zero.
    Attempt {
        context: &'a RequestContext,
        attempt: u32,
    },
    /// Sent with [`Event::Response`].
    Response(&'a Response),
    /// Sent with [`Event::Error`].
    Error(&'a NetworkError),
}

pub type EventHandler = Arc<dyn Fn(&EventPayload<'_>) + Send + Sync>;

/// Identifies a registered handler for [`EventHub::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe point for the four lifecycle signals.
///
/// Handlers run synchronously in registration order. A panicking handler
/// unwinds into the emitter; handlers never influence dispatch outcomes.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Event, EventHandler)>>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.lock().len())
            .finish()
    }
}

impl EventHub {
    /// Creates a hub without handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`, after any handler already registered.
    pub fn on<F>(&self, event: Event, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, event, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _, _)| *existing != id);
        handlers.len() != before
    }

    /// Runs every handler registered for `event` with `payload`.
    pub fn emit(&self, event: Event, payload: &EventPayload<'_>) {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<EventHandler> = self
            .lock()
            .iter()
            .filter(|(_, registered, _)| *registered == event)
            .map(|(_, _, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(payload);
        }
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: Event) -> usize {
        self.lock()
            .iter()
            .filter(|(_, registered, _)| *registered == event)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Event, EventHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
