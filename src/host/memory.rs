//! In-memory host backend.
//!
//! Thread-safe implementations of the host capability traits. Intended for
//! embedded usage, tests, benchmarks and fixture replay.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::host::traits::{ActionSink, DeviceStore, HostError, VariableStore};
use crate::ids::{DeviceId, ListenerId, VariableId};
use crate::object::{DeviceSnapshot, VariableSnapshot};

fn lock_err(context: &'static str) -> HostError {
    HostError::Backend(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory variable store.
///
/// Every successful write is also appended to a journal so callers can
/// check exactly which writes the engine performed.
#[derive(Debug, Default)]
pub struct InMemoryVariables {
    state: RwLock<HashMap<VariableId, VariableSnapshot>>,
    writes: Mutex<Vec<(VariableId, String)>>,
}

impl InMemoryVariables {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable.
    pub fn insert(&self, variable: VariableSnapshot) -> Result<(), HostError> {
        let mut state = self.state.write().map_err(|_| lock_err("variables.insert"))?;
        state.insert(variable.id, variable);
        Ok(())
    }

    /// Delete a variable, returning it if it existed.
    pub fn remove(&self, id: VariableId) -> Result<Option<VariableSnapshot>, HostError> {
        let mut state = self.state.write().map_err(|_| lock_err("variables.remove"))?;
        Ok(state.remove(&id))
    }

    /// Writes performed through [`VariableStore::write_variable`], in order.
    pub fn writes(&self) -> Result<Vec<(VariableId, String)>, HostError> {
        let writes = self.writes.lock().map_err(|_| lock_err("variables.writes"))?;
        Ok(writes.clone())
    }
}

impl VariableStore for InMemoryVariables {
    fn read_variable(&self, id: VariableId) -> Result<VariableSnapshot, HostError> {
        let state = self.state.read().map_err(|_| lock_err("variables.read"))?;
        state
            .get(&id)
            .cloned()
            .ok_or_else(|| HostError::variable_not_found(id))
    }

    fn write_variable(&self, id: VariableId, value: &str) -> Result<(), HostError> {
        {
            let mut state = self.state.write().map_err(|_| lock_err("variables.write"))?;
            let var = state
                .get_mut(&id)
                .ok_or_else(|| HostError::variable_not_found(id))?;
            var.value = value.to_string();
        }
        let mut writes = self.writes.lock().map_err(|_| lock_err("variables.writes"))?;
        writes.push((id, value.to_string()));
        Ok(())
    }
}

/// Thread-safe in-memory device store.
#[derive(Debug, Default)]
pub struct InMemoryDevices {
    state: RwLock<HashMap<DeviceId, DeviceSnapshot>>,
}

impl InMemoryDevices {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device.
    pub fn insert(&self, device: DeviceSnapshot) -> Result<(), HostError> {
        let mut state = self.state.write().map_err(|_| lock_err("devices.insert"))?;
        state.insert(device.id, device);
        Ok(())
    }

    /// Delete a device, returning it if it existed.
    pub fn remove(&self, id: DeviceId) -> Result<Option<DeviceSnapshot>, HostError> {
        let mut state = self.state.write().map_err(|_| lock_err("devices.remove"))?;
        Ok(state.remove(&id))
    }
}

impl DeviceStore for InMemoryDevices {
    fn read_device(&self, id: DeviceId) -> Result<DeviceSnapshot, HostError> {
        let state = self.state.read().map_err(|_| lock_err("devices.read"))?;
        state
            .get(&id)
            .cloned()
            .ok_or_else(|| HostError::device_not_found(id))
    }
}

/// Action sink that records every requested action.
#[derive(Debug, Default)]
pub struct RecordingActions {
    fired: Mutex<Vec<ListenerId>>,
}

impl RecordingActions {
    /// Creates a sink with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions requested so far, in order. Empty if the lock was poisoned.
    #[must_use]
    pub fn fired(&self) -> Vec<ListenerId> {
        self.fired.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl ActionSink for RecordingActions {
    fn fire_action(&self, listener: ListenerId) {
        if let Ok(mut fired) = self.fired.lock() {
            fired.push(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    #[test]
    fn write_updates_value_and_journal() {
        let vars = InMemoryVariables::new();
        vars.insert(VariableSnapshot::new(VariableId::new(55), "lastTrigger", ""))
            .unwrap();

        vars.write_variable(VariableId::new(55), "Porch Sensor").unwrap();

        let var = vars.read_variable(VariableId::new(55)).unwrap();
        assert_eq!(var.value, "Porch Sensor");
        assert_eq!(
            vars.writes().unwrap(),
            vec![(VariableId::new(55), "Porch Sensor".to_string())]
        );
    }

    #[test]
    fn write_to_missing_variable_is_not_found() {
        let vars = InMemoryVariables::new();
        let err = vars.write_variable(VariableId::new(999), "x").unwrap_err();
        assert_eq!(
            err,
            HostError::NotFound {
                kind: ObjectKind::Variable,
                id: 999
            }
        );
        assert!(vars.writes().unwrap().is_empty());
    }

    #[test]
    fn removed_device_is_not_found() {
        let devices = InMemoryDevices::new();
        devices
            .insert(DeviceSnapshot::new(DeviceId::new(100), "Porch Sensor"))
            .unwrap();
        assert!(devices.read_device(DeviceId::new(100)).is_ok());
        devices.remove(DeviceId::new(100)).unwrap();
        assert!(devices.read_device(DeviceId::new(100)).is_err());
    }

    #[test]
    fn recording_actions_keeps_order() {
        let actions = RecordingActions::new();
        actions.fire_action(ListenerId::new(2));
        actions.fire_action(ListenerId::new(1));
        assert_eq!(actions.fired(), vec![ListenerId::new(2), ListenerId::new(1)]);
    }
}
