//! Error types for changewatch.
//!
//! All errors are strongly typed using thiserror. None of them is fatal to
//! the engine: every error is scoped to one listener and one event, and is
//! reported to the caller and the log rather than aborting dispatch.

use thiserror::Error;

use crate::host::HostError;
use crate::ids::{ListenerId, VariableId};
use crate::object::ObjectKind;

/// Validation errors for configurations and incoming updates.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },

    #[error("Update pair mixes {kind} {old} with {kind} {new}")]
    MismatchedUpdate {
        kind: ObjectKind,
        old: u64,
        new: u64,
    },
}

/// Errors raised while activating or dispatching to a listener.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Listener \"{name}\" ({listener}) is obsolete, missing {fields:?} (edit/save to update)")]
    ConfigurationObsolete {
        listener: ListenerId,
        name: String,
        fields: Vec<String>,
    },

    #[error("Listener {listener} references missing {kind} {id}")]
    MissingReferencedObject {
        listener: ListenerId,
        kind: ObjectKind,
        id: u64,
    },

    #[error("Listener {listener} would save to its own watched variable {variable}")]
    SelfReferentialSave {
        listener: ListenerId,
        variable: VariableId,
    },

    #[error("Host error: {message}")]
    Host {
        message: String,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },
}

/// Top-level error type for changewatch.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ListenerError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error reports a missing device or variable.
    #[must_use]
    pub const fn is_missing_object(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::MissingReferencedObject { .. })
                | Self::Host(HostError::NotFound { .. })
        )
    }

    /// Listener the error is scoped to, when known.
    #[must_use]
    pub const fn listener(&self) -> Option<ListenerId> {
        match self {
            Self::Execution(
                ExecutionError::ConfigurationObsolete { listener, .. }
                | ExecutionError::MissingReferencedObject { listener, .. }
                | ExecutionError::SelfReferentialSave { listener, .. },
            ) => Some(*listener),
            _ => None,
        }
    }
}

/// Result type alias for changewatch operations.
pub type ListenerResult<T> = Result<T, ListenerError>;
