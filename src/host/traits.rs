//! Capabilities the engine consumes from its host.
//!
//! The host owns the real devices and variables and knows how to run a
//! listener's action. The engine only ever sees these traits, so an
//! in-memory host (see [`super::memory`]) can stand in for tests and replay.

use crossbeam_channel::{Sender, TrySendError};
use log::warn;
use thiserror::Error;

use crate::ids::{DeviceId, ListenerId, VariableId};
use crate::object::{DeviceSnapshot, ObjectKind, VariableSnapshot};

/// Errors returned by host capabilities.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The referenced object does not exist (any more).
    #[error("{kind} not found: {id}")]
    NotFound { kind: ObjectKind, id: u64 },

    /// Backend failure.
    #[error("Host backend error: {0}")]
    Backend(String),
}

impl HostError {
    /// Shorthand for a missing variable.
    #[must_use]
    pub const fn variable_not_found(id: VariableId) -> Self {
        Self::NotFound {
            kind: ObjectKind::Variable,
            id: id.get(),
        }
    }

    /// Shorthand for a missing device.
    #[must_use]
    pub const fn device_not_found(id: DeviceId) -> Self {
        Self::NotFound {
            kind: ObjectKind::Device,
            id: id.get(),
        }
    }
}

/// Read/write access to host variables.
pub trait VariableStore: Send + Sync {
    /// Read a variable.
    fn read_variable(&self, id: VariableId) -> Result<VariableSnapshot, HostError>;

    /// Overwrite a variable's value. Returns `NotFound` if it was deleted.
    fn write_variable(&self, id: VariableId, value: &str) -> Result<(), HostError>;
}

/// Read access to host devices.
///
/// Only the listener report reads devices; the match engine works purely on
/// the snapshots carried by update events.
pub trait DeviceStore: Send + Sync {
    /// Read a device.
    fn read_device(&self, id: DeviceId) -> Result<DeviceSnapshot, HostError>;
}

/// Runs the action attached to a listener.
///
/// Fire-and-forget: implementations must not block the dispatch thread. A
/// slow action should be handed off, for example through a channel.
pub trait ActionSink: Send + Sync {
    /// Request the listener's action.
    fn fire_action(&self, listener: ListenerId);
}

impl ActionSink for Sender<ListenerId> {
    fn fire_action(&self, listener: ListenerId) {
        match self.try_send(listener) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("action queue full, dropping action for listener {listener}");
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("action receiver gone, dropping action for listener {listener}");
            }
        }
    }
}
