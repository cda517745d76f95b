//! # changewatch - group change listeners for home automation hosts
//!
//! changewatch lets an automation host fire one action when any member of a
//! group of devices or variables changes. It sits between the host's change
//! feed and its action scheduler.
//!
//! ## Core Concepts
//!
//! - **Listener**: a watch list, a significance filter and an action, identified by a [`ListenerId`]
//! - **Update**: an (old, new) snapshot pair of one device or variable
//! - **Fire**: the decision that an update is significant for a listener
//! - **Save target**: an optional variable that receives the name or id of the object that fired
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use changewatch::host::{ActionSink, InMemoryVariables, RecordingActions, VariableStore};
//! use changewatch::{DeviceId, DeviceSnapshot, Dispatcher, EngineConfig, ListenerConfig, ListenerId};
//!
//! let actions = Arc::new(RecordingActions::new());
//! let dispatcher = Dispatcher::new(
//!     &EngineConfig::default(),
//!     Arc::new(InMemoryVariables::new()) as Arc<dyn VariableStore>,
//!     Arc::clone(&actions) as Arc<dyn ActionSink>,
//! );
//!
//! let porch = ListenerConfig::new(ListenerId::new(1), "porch", "4.0").watch_device(DeviceId::new(100));
//! dispatcher.registry().insert(changewatch::Listener::new(porch))?;
//!
//! let old = DeviceSnapshot::new(DeviceId::new(100), "Porch Sensor").with_state("temperature", 70);
//! let new = old.clone().with_state("temperature", 72);
//! let report = dispatcher.on_device_updated(&old, &new);
//!
//! assert!(report.has_fired(ListenerId::new(1)));
//! assert_eq!(actions.fired(), vec![ListenerId::new(1)]);
//! # Ok::<(), changewatch::ListenerError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod ids;
pub mod object;
pub mod value;

// Engine
pub mod config;
pub mod host;
pub mod listener;

// Re-export primary types at crate root for convenience
pub use config::{EngineConfig, CURRENT_SCHEMA_VERSION};
pub use error::{ExecutionError, ListenerError, ListenerResult, ValidationError};
pub use host::{ActionSink, DeviceStore, HostError, VariableStore};
pub use ids::{DeviceId, ListenerId, VariableId};
pub use object::{DeviceSnapshot, ObjectKind, StateMap, TriggeringObject, UpdatePair, VariableSnapshot};
pub use value::StateValue;

pub use listener::{
    describe_listeners, evaluate_device_update, evaluate_variable_update, migrate, validate_props,
    Activation, ChangeEvent, ChangeFeed, DispatchReport, Dispatcher, Fire, FireCause, FireDecision,
    FilterLogic, Listener, ListenerConfig, ListenerSummary, Migration, RawListenerConfig, SaveValueKind,
};
