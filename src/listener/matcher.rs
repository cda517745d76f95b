//! Fire/no-fire decisions for device and variable updates.
//!
//! Both entry points are pure: the decision depends only on the listener's
//! configuration and the (old, new) snapshot pair.

use serde::{Deserialize, Serialize};

use crate::listener::config::ListenerConfig;
use crate::object::{DeviceSnapshot, TriggeringObject, VariableSnapshot};

/// Why a listener fired.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FireCause {
    /// Basic mode: the state map differs.
    StatesChanged,
    /// Advanced mode: the first significant state key found.
    StateChanged { key: String },
    /// Advanced mode: the communication-enabled flag flipped.
    EnabledChanged,
    /// A watched variable's value changed.
    ValueChanged,
}

/// A positive decision.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fire {
    pub trigger: TriggeringObject,
    pub cause: FireCause,
}

/// Outcome of evaluating one update against one listener.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireDecision {
    NoFire,
    Fire(Fire),
}

impl FireDecision {
    /// True for [`FireDecision::Fire`].
    #[must_use]
    pub const fn is_fire(&self) -> bool {
        matches!(self, Self::Fire(_))
    }
}

/// Decides whether a variable update fires `cfg`.
///
/// Only the value is observed; renames and other property edits never fire.
#[must_use]
pub fn evaluate_variable_update(
    cfg: &ListenerConfig,
    old: &VariableSnapshot,
    new: &VariableSnapshot,
) -> FireDecision {
    if !cfg.watches_variable(new.id) {
        return FireDecision::NoFire;
    }
    if old.value == new.value {
        return FireDecision::NoFire;
    }
    FireDecision::Fire(Fire {
        trigger: TriggeringObject::from_snapshot(new),
        cause: FireCause::ValueChanged,
    })
}

/// Decides whether a device update fires `cfg`.
#[must_use]
pub fn evaluate_device_update(
    cfg: &ListenerConfig,
    old: &DeviceSnapshot,
    new: &DeviceSnapshot,
) -> FireDecision {
    if !cfg.watches_device(new.id) {
        return FireDecision::NoFire;
    }

    let cause = if cfg.advanced_mode {
        advanced_cause(cfg, old, new)
    } else {
        (old.states != new.states).then_some(FireCause::StatesChanged)
    };

    match cause {
        Some(cause) => FireDecision::Fire(Fire {
            trigger: TriggeringObject::from_snapshot(new),
            cause,
        }),
        None => FireDecision::NoFire,
    }
}

fn advanced_cause(cfg: &ListenerConfig, old: &DeviceSnapshot, new: &DeviceSnapshot) -> Option<FireCause> {
    if let Some(key) = first_significant_key(cfg, old, new) {
        return Some(FireCause::StateChanged {
            key: key.to_string(),
        });
    }
    if cfg.comm_enabled_watch && old.enabled != new.enabled {
        return Some(FireCause::EnabledChanged);
    }
    None
}

/// First key of `new.states` whose value changed and which the filter marks
/// significant. Keys only present in `old` are never considered.
#[must_use]
pub fn first_significant_key<'a>(
    cfg: &ListenerConfig,
    old: &DeviceSnapshot,
    new: &'a DeviceSnapshot,
) -> Option<&'a str> {
    new.states
        .iter()
        .filter(|(key, value)| old.states.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.as_str())
        .find(|key| cfg.filter_logic.is_significant(key, &cfg.state_filter))
}
