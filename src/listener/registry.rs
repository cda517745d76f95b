//! Registry of active listeners.
//!
//! The registry is the only mutable state shared between the dispatch thread
//! and the host's lifecycle callbacks. It is copy-on-write: every mutation
//! builds a new map and swaps it in under a short write lock, and dispatch
//! works on an `Arc` snapshot taken under a short read lock. A dispatch pass
//! therefore sees either the old or the new configuration of a listener,
//! never a mix of both.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::{ListenerError, ListenerResult};
use crate::ids::ListenerId;
use crate::listener::config::ListenerConfig;

fn lock_err(context: &'static str) -> ListenerError {
    ListenerError::internal(format!("poisoned lock: {context}"))
}

/// A live listener: its configuration and when it was activated.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub config: Arc<ListenerConfig>,
    pub activated_at: DateTime<Utc>,
}

impl Listener {
    /// Wraps `config`, stamped with the current time.
    #[must_use]
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config: Arc::new(config),
            activated_at: Utc::now(),
        }
    }

    /// The listener's id.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.config.id
    }
}

/// Point-in-time view of the registry.
pub type RegistrySnapshot = Arc<HashMap<ListenerId, Arc<Listener>>>;

/// Thread-safe, copy-on-write listener registry.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<RegistrySnapshot>,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a listener, replacing any listener with the same id.
    ///
    /// Returns the replaced listener.
    pub fn insert(&self, listener: Listener) -> ListenerResult<Option<Arc<Listener>>> {
        let mut entries = self.entries.write().map_err(|_| lock_err("registry.insert"))?;
        let mut next = HashMap::clone(&entries);
        let previous = next.insert(listener.id(), Arc::new(listener));
        *entries = Arc::new(next);
        Ok(previous)
    }

    /// Removes a listener. Returns `None` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> ListenerResult<Option<Arc<Listener>>> {
        let mut entries = self.entries.write().map_err(|_| lock_err("registry.remove"))?;
        if !entries.contains_key(&id) {
            return Ok(None);
        }
        let mut next = HashMap::clone(&entries);
        let previous = next.remove(&id);
        *entries = Arc::new(next);
        Ok(previous)
    }

    /// Looks up one listener.
    pub fn get(&self, id: ListenerId) -> ListenerResult<Option<Arc<Listener>>> {
        let entries = self.entries.read().map_err(|_| lock_err("registry.get"))?;
        Ok(entries.get(&id).cloned())
    }

    /// Current listeners. Later mutations do not affect the returned map.
    pub fn snapshot(&self) -> ListenerResult<RegistrySnapshot> {
        let entries = self.entries.read().map_err(|_| lock_err("registry.snapshot"))?;
        Ok(Arc::clone(&entries))
    }

    /// Number of registered listeners.
    pub fn len(&self) -> ListenerResult<usize> {
        Ok(self.snapshot()?.len())
    }

    /// True when no listener is registered.
    pub fn is_empty(&self) -> ListenerResult<bool> {
        Ok(self.snapshot()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DeviceId;

    fn config(id: u64) -> ListenerConfig {
        ListenerConfig::new(ListenerId::new(id), format!("listener {id}"), "4.0")
    }

    #[test]
    fn insert_get_remove() {
        let registry = Registry::new();
        assert!(registry.is_empty().unwrap());

        assert!(registry.insert(Listener::new(config(1))).unwrap().is_none());
        assert_eq!(registry.len().unwrap(), 1);
        assert!(registry.get(ListenerId::new(1)).unwrap().is_some());

        assert!(registry.remove(ListenerId::new(1)).unwrap().is_some());
        assert!(registry.remove(ListenerId::new(1)).unwrap().is_none());
        assert!(registry.get(ListenerId::new(1)).unwrap().is_none());
    }

    #[test]
    fn insert_replaces_in_place() {
        let registry = Registry::new();
        registry.insert(Listener::new(config(1))).unwrap();

        let edited = config(1).watch_device(DeviceId::new(100));
        let previous = registry.insert(Listener::new(edited)).unwrap().unwrap();
        assert!(previous.config.watched_devices.is_empty());

        let current = registry.get(ListenerId::new(1)).unwrap().unwrap();
        assert!(current.config.watches_device(DeviceId::new(100)));
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutations() {
        let registry = Registry::new();
        registry.insert(Listener::new(config(1))).unwrap();

        let snapshot = registry.snapshot().unwrap();
        registry.insert(Listener::new(config(2))).unwrap();
        registry.remove(ListenerId::new(1)).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&ListenerId::new(1)));
        assert_eq!(registry.len().unwrap(), 1);
        assert!(registry.get(ListenerId::new(2)).unwrap().is_some());
    }
}
