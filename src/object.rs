//! Snapshots of watched objects as delivered by the host's change feed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{DeviceId, VariableId};
use crate::value::StateValue;

/// Device states keyed by state name.
pub type StateMap = BTreeMap<String, StateValue>;

/// Kind of a watched object.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Device,
    Variable,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// Point-in-time view of a device.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub states: StateMap,
}

const fn default_enabled() -> bool {
    true
}

impl DeviceSnapshot {
    /// Creates an enabled device with no states.
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            states: StateMap::new(),
        }
    }

    /// Sets a state value.
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.states.insert(key.into(), value.into());
        self
    }

    /// Removes a state.
    #[must_use]
    pub fn without_state(mut self, key: &str) -> Self {
        self.states.remove(key);
        self
    }

    /// Sets the communication-enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Point-in-time view of a variable.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSnapshot {
    pub id: VariableId,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl VariableSnapshot {
    /// Creates a variable snapshot.
    pub fn new(id: VariableId, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns a copy holding a different value.
    #[must_use]
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self.clone()
        }
    }
}

/// Common view over device and variable snapshots.
pub trait Snapshot {
    /// Kind of the object.
    const KIND: ObjectKind;

    /// Raw host id of the object.
    fn raw_id(&self) -> u64;

    /// Display name of the object.
    fn name(&self) -> &str;
}

impl Snapshot for DeviceSnapshot {
    const KIND: ObjectKind = ObjectKind::Device;

    fn raw_id(&self) -> u64 {
        self.id.get()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Snapshot for VariableSnapshot {
    const KIND: ObjectKind = ObjectKind::Variable;

    fn raw_id(&self) -> u64 {
        self.id.get()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An (old, new) snapshot pair of the same object.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePair<T> {
    pub old: T,
    pub new: T,
}

impl<T: Snapshot> UpdatePair<T> {
    /// Pairs two snapshots, rejecting snapshots of different objects.
    pub fn new(old: T, new: T) -> Result<Self, ValidationError> {
        check_same_object(&old, &new)?;
        Ok(Self { old, new })
    }

    /// Re-checks the pairing invariant (deserialized pairs bypass `new`).
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_same_object(&self.old, &self.new)
    }
}

pub(crate) fn check_same_object<T: Snapshot>(old: &T, new: &T) -> Result<(), ValidationError> {
    if old.raw_id() == new.raw_id() {
        Ok(())
    } else {
        Err(ValidationError::MismatchedUpdate {
            kind: T::KIND,
            old: old.raw_id(),
            new: new.raw_id(),
        })
    }
}

/// The object whose update made a listener fire.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeringObject {
    pub kind: ObjectKind,
    pub id: u64,
    pub name: String,
}

impl TriggeringObject {
    pub(crate) fn from_snapshot<T: Snapshot>(snapshot: &T) -> Self {
        Self {
            kind: T::KIND,
            id: snapshot.raw_id(),
            name: snapshot.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_pair_rejects_different_objects() {
        let a = VariableSnapshot::new(VariableId::new(1), "a", "x");
        let b = VariableSnapshot::new(VariableId::new(2), "b", "x");
        let err = UpdatePair::new(a.clone(), b).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MismatchedUpdate { kind: ObjectKind::Variable, old: 1, new: 2 }
        ));
        assert!(UpdatePair::new(a.clone(), a.with_value("y")).is_ok());
    }

    #[test]
    fn device_snapshot_deserializes_with_defaults() {
        let dev: DeviceSnapshot =
            serde_json::from_str(r#"{"id": 100, "name": "Porch Sensor"}"#).unwrap();
        assert!(dev.enabled);
        assert!(dev.states.is_empty());
    }

    #[test]
    fn triggering_object_captures_identity() {
        let dev = DeviceSnapshot::new(DeviceId::new(100), "Porch Sensor");
        let t = TriggeringObject::from_snapshot(&dev);
        assert_eq!(t.kind, ObjectKind::Device);
        assert_eq!(t.id, 100);
        assert_eq!(t.name, "Porch Sensor");
    }
}
