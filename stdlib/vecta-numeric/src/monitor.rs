//! Observers of structural changes to array vectors.
//!
//! Monitors are registered explicitly and return a [`MonitorKey`]; they
//! stay registered until [`MonitorRegistry::detach`] is called with that
//! key. Only index table replacement notifies them.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Size characteristics before and after a re-indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeChange {
    /// Element size before.
    pub old_element_size: usize,
    /// Element size after.
    pub new_element_size: usize,
    /// Known size before.
    pub old_known_size: usize,
    /// Known size after.
    pub new_known_size: usize,
    /// Unknown size before.
    pub old_unknown_size: usize,
    /// Unknown size after.
    pub new_unknown_size: usize,
}

/// Receives size change notifications.
pub trait VectorMonitor: Send + Sync {
    /// Called once per re-indexing.
    fn notify(&self, change: &SizeChange);
}

impl<F> VectorMonitor for F
where
    F: Fn(&SizeChange) + Send + Sync,
{
    fn notify(&self, change: &SizeChange) {
        self(change)
    }
}

/// Handle returned by monitor registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorKey(u64);

/// Ordered list of registered monitors.
#[derive(Default)]
pub struct MonitorRegistry {
    inner: Mutex<MonitorList>,
}

#[derive(Default)]
struct MonitorList {
    next_key: u64,
    entries: Vec<(MonitorKey, Arc<dyn VectorMonitor>)>,
}

impl MonitorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `monitor`.
    pub fn attach(&self, monitor: Arc<dyn VectorMonitor>) -> MonitorKey {
        let mut list = self.inner.lock();
        let key = MonitorKey(list.next_key);
        list.next_key += 1;
        list.entries.push((key, monitor));
        key
    }

    /// Unregister the monitor behind `key`. Returns false for unknown keys.
    pub fn detach(&self, key: MonitorKey) -> bool {
        let mut list = self.inner.lock();
        let before = list.entries.len();
        list.entries.retain(|(entry, _)| *entry != key);
        list.entries.len() != before
    }

    /// Number of registered monitors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if no monitor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `change` to every monitor in registration order.
    pub fn notify(&self, change: &SizeChange) {
        // Snapshot so a monitor may attach or detach while being notified.
        let monitors: Vec<_> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, monitor)| Arc::clone(monitor))
            .collect();
        for monitor in monitors {
            monitor.notify(change);
        }
    }
}

impl fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorRegistry")
            .field("monitors", &self.len())
            .finish()
    }
}
