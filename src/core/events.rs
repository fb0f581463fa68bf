//! Typed Event Bus
//!
//! Synchronous publish/subscribe over a closed set of channels.
//! Each emitter declares its channels up front; subscribers are
//! identified by name so they can be removed in bulk later.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// An event that can travel over an [`EventBus`].
///
/// The kind selects the channel the event is delivered on.
pub trait BusEvent {
    /// Channel identifier (closed set per emitter).
    type Kind: Copy + Ord + Debug;

    /// Channel this event belongs to.
    fn kind(&self) -> Self::Kind;
}

/// Subscriber callback.
pub type Callback<E> = Box<dyn FnMut(&E) + Send>;

struct Subscriber<E> {
    id: String,
    callback: Callback<E>,
}

/// Synchronous event bus.
///
/// `emit` runs every subscriber of the event's channel on the caller's
/// stack, in subscription order, before returning.
pub struct EventBus<E: BusEvent> {
    channels: BTreeMap<E::Kind, Vec<Subscriber<E>>>,
}

impl<E: BusEvent> EventBus<E> {
    /// Create a bus with no channels.
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// Create a bus with the given channels declared.
    pub fn with_channels(kinds: &[E::Kind]) -> Self {
        let mut bus = Self::new();
        for kind in kinds {
            bus.register(*kind);
        }
        bus
    }

    /// Declare a channel. Returns false if it already exists.
    pub fn register(&mut self, kind: E::Kind) -> bool {
        if self.channels.contains_key(&kind) {
            return false;
        }
        self.channels.insert(kind, Vec::new());
        true
    }

    /// Check if a channel is declared.
    pub fn is_registered(&self, kind: E::Kind) -> bool {
        self.channels.contains_key(&kind)
    }

    /// Attach a callback under a subscriber name.
    ///
    /// Fails if the channel was never declared.
    pub fn subscribe<F>(&mut self, kind: E::Kind, subscriber: impl Into<String>, callback: F) -> bool
    where
        F: FnMut(&E) + Send + 'static,
    {
        match self.channels.get_mut(&kind) {
            Some(subscribers) => {
                subscribers.push(Subscriber {
                    id: subscriber.into(),
                    callback: Box::new(callback),
                });
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every subscriber of its channel.
    pub fn emit(&mut self, event: &E) -> bool {
        match self.channels.get_mut(&event.kind()) {
            Some(subscribers) => {
                for subscriber in subscribers.iter_mut() {
                    (subscriber.callback)(event);
                }
                true
            }
            None => false,
        }
    }

    /// Remove every callback registered under `subscriber` on a channel.
    pub fn unsubscribe(&mut self, kind: E::Kind, subscriber: &str) -> bool {
        match self.channels.get_mut(&kind) {
            Some(subscribers) => {
                subscribers.retain(|s| s.id != subscriber);
                true
            }
            None => false,
        }
    }

    /// Drop all subscribers of a channel. The channel stays declared.
    pub fn clear(&mut self, kind: E::Kind) -> bool {
        match self.channels.get_mut(&kind) {
            Some(subscribers) => {
                subscribers.clear();
                true
            }
            None => false,
        }
    }

    /// Number of subscribers on a channel.
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.channels.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to an [`EventBus`].
///
/// Used where one emitter relays into another emitter's bus
/// (session -> directory, action pipeline -> session).
/// A callback must not emit on the same shared bus that is delivering to it.
pub struct SharedEventBus<E: BusEvent> {
    inner: Arc<Mutex<EventBus<E>>>,
}

impl<E: BusEvent> SharedEventBus<E> {
    /// Wrap a bus.
    pub fn new(bus: EventBus<E>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Create a shared bus with the given channels declared.
    pub fn with_channels(kinds: &[E::Kind]) -> Self {
        Self::new(EventBus::with_channels(kinds))
    }

    fn bus(&self) -> MutexGuard<'_, EventBus<E>> {
        // A panicking subscriber must not take the whole bus down with it.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// See [`EventBus::register`].
    pub fn register(&self, kind: E::Kind) -> bool {
        self.bus().register(kind)
    }

    /// See [`EventBus::subscribe`].
    pub fn subscribe<F>(&self, kind: E::Kind, subscriber: impl Into<String>, callback: F) -> bool
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.bus().subscribe(kind, subscriber, callback)
    }

    /// See [`EventBus::emit`].
    pub fn emit(&self, event: &E) -> bool {
        self.bus().emit(event)
    }

    /// See [`EventBus::unsubscribe`].
    pub fn unsubscribe(&self, kind: E::Kind, subscriber: &str) -> bool {
        self.bus().unsubscribe(kind, subscriber)
    }

    /// See [`EventBus::clear`].
    pub fn clear(&self, kind: E::Kind) -> bool {
        self.bus().clear(kind)
    }

    /// See [`EventBus::subscriber_count`].
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.bus().subscriber_count(kind)
    }
}

impl<E: BusEvent> Clone for SharedEventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
