use std::fmt;

/// Handle returned by [`HasChangesSignal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(bool) + Send>;

/// Edge-triggered "has unsaved changes" flag.
///
/// Listeners run synchronously inside [`set`](Self::set), and only when the
/// value actually flips.
pub struct HasChangesSignal {
    value: bool,
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl HasChangesSignal {
    pub fn new() -> Self {
        Self {
            value: false,
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn get(&self) -> bool {
        self.value
    }

    /// Update the flag. Returns true, after notifying, if it flipped.
    pub fn set(&mut self, value: bool) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        tracing::debug!(has_changes = value, "has-changes transitioned");
        for (_, listener) in &mut self.listeners {
            listener(value);
        }
        true
    }

    pub fn subscribe(&mut self, listener: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for HasChangesSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HasChangesSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasChangesSignal")
            .field("value", &self.value)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
