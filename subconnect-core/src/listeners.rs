use std::fmt;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Unsubscribe closures for the listeners attached to the active connector.
///
/// The store owns exactly one registry and drains it before attaching a new
/// listener set, so a connector never has more than one registration set.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Vec<(&'static str, Cleanup)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: &'static str, cleanup: impl FnOnce() + Send + 'static) {
        self.entries.push((label, Box::new(cleanup)));
    }

    /// Removes every registered cleanup and returns them, in registration
    /// order, so the caller can run them outside any lock.
    pub fn take(&mut self) -> Vec<(&'static str, Cleanup)> {
        std::mem::take(&mut self.entries)
    }

    /// Runs and removes every registered cleanup. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        run(self.take())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(label, _)| *label).collect()
    }
}

/// Runs cleanups taken from a registry.
pub fn run(entries: Vec<(&'static str, Cleanup)>) -> usize {
    let count = entries.len();
    for (label, cleanup) in entries {
        tracing::trace!(listener = label, "Removing connector listener");
        cleanup();
    }
    count
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.labels())
            .finish()
    }
}
