//! # Connector Events
//!
//! Every connector owns one [`EventEmitter`]. The session layer attaches its
//! listeners through [`EventEmitter::on`] and detaches them through
//! [`EventEmitter::off`] with the returned [`ListenerId`].
//!
//! Listeners run synchronously on the emitting task. The emitter never holds
//! its internal lock while a listener runs, so a listener may detach itself
//! or other listeners.

use crate::{account::Account, sync::lock};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

/// The kinds of events a connector emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    AccountsChanged,
    /// Relay connectors only: a pairing URI is ready to be displayed.
    GetUri,
}

/// An event emitted by a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Connect(Vec<Account>),
    Disconnect,
    AccountsChanged(Vec<Account>),
    GetUri(String),
}

impl ConnectorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectorEvent::Connect(_) => EventKind::Connect,
            ConnectorEvent::Disconnect => EventKind::Disconnect,
            ConnectorEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            ConnectorEvent::GetUri(_) => EventKind::GetUri,
        }
    }
}

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ConnectorEvent) + Send + Sync>;

/// A small synchronous event emitter.
#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, EventKind, Listener)>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectorEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, kind, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers `event` to every listener registered for its kind and returns
    /// the number of listeners invoked.
    pub fn emit(&self, event: ConnectorEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<Listener> = lock(&self.listeners)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();

        for listener in &targets {
            listener(&event);
        }
        targets.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock(&self.listeners)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        lock(&self.listeners).len()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.total_listeners())
            .finish()
    }
}
