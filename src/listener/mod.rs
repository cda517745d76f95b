//! Change listeners.
//!
//! A listener watches a set of devices and variables and fires an action when
//! one of them changes in a way its configuration considers significant.
//! Everything runs in-process: the host feeds updates in through the
//! [`Dispatcher`] (directly or via a [`ChangeFeed`] worker) and receives
//! action requests through the [`crate::host::ActionSink`] it supplied.

/// Typed listener configuration and host property parsing.
pub mod config;
/// Update routing, lifecycle callbacks and the save side effect.
pub mod dispatcher;
/// Ordered background delivery of change events.
pub mod feed;
/// Pure fire/no-fire decisions.
pub mod matcher;
/// Schema migration of stored configurations.
pub mod migrate;
/// Copy-on-write registry of active listeners.
pub mod registry;
/// Operator-facing listener summaries.
pub mod report;
/// Edit-time validation.
pub mod validate;

pub use config::{FilterLogic, ListenerConfig, Props, RawListenerConfig, SaveValueKind};
pub use dispatcher::{Activation, DispatchReport, Dispatcher};
pub use feed::{ChangeEvent, ChangeFeed};
pub use matcher::{evaluate_device_update, evaluate_variable_update, Fire, FireCause, FireDecision};
pub use migrate::{migrate, Migration};
pub use registry::{Listener, Registry};
pub use report::{describe_listeners, ListenerSummary, ObjectRef};
pub use validate::validate_props;
