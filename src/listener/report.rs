//! Structured listener report.
//!
//! Backs the host's "list all listeners" command: every listener with the
//! current names of the objects it references. References that no longer
//! resolve are kept in the report (with no name) and logged as errors, so
//! the operator can find listeners pointing at deleted devices or variables.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, ListenerError};
use crate::host::{DeviceStore, HostError, VariableStore};
use crate::ids::ListenerId;
use crate::listener::config::{FilterLogic, ListenerConfig, SaveValueKind};
use crate::listener::registry::Listener;
use crate::object::ObjectKind;

/// A referenced device or variable.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: u64,
    /// `None` when the object no longer exists.
    pub name: Option<String>,
}

impl ObjectRef {
    /// True when the referenced object no longer exists.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        self.name.is_none()
    }
}

/// One listener as shown to the operator.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSummary {
    pub id: ListenerId,
    pub name: String,
    pub activated_at: DateTime<Utc>,
    pub devices: Vec<ObjectRef>,
    pub variables: Vec<ObjectRef>,
    pub advanced_mode: bool,
    pub filter_logic: FilterLogic,
    pub state_filter: Vec<String>,
    pub comm_enabled_watch: bool,
    pub save_target: Option<ObjectRef>,
    pub save_value_kind: SaveValueKind,
    #[serde(skip)]
    pub problems: Vec<ListenerError>,
}

/// Summarizes `listeners`, resolving object names through the host.
pub fn describe_listeners(
    listeners: &[Arc<Listener>],
    devices: &dyn DeviceStore,
    variables: &dyn VariableStore,
) -> Vec<ListenerSummary> {
    listeners
        .iter()
        .map(|listener| describe(listener, devices, variables))
        .collect()
}

fn describe(listener: &Listener, devices: &dyn DeviceStore, variables: &dyn VariableStore) -> ListenerSummary {
    let cfg: &ListenerConfig = &listener.config;
    let mut problems = Vec::new();

    let device_refs: Vec<ObjectRef> = cfg
        .watched_devices
        .iter()
        .map(|id| {
            let name = devices.read_device(*id).map(|d| d.name);
            resolve(cfg, ObjectKind::Device, id.get(), name, &mut problems)
        })
        .collect();

    let variable_refs: Vec<ObjectRef> = cfg
        .watched_variables
        .iter()
        .map(|id| {
            let name = variables.read_variable(*id).map(|v| v.name);
            resolve(cfg, ObjectKind::Variable, id.get(), name, &mut problems)
        })
        .collect();

    let save_target = cfg.save_target.map(|id| {
        let name = variables.read_variable(id).map(|v| v.name);
        resolve(cfg, ObjectKind::Variable, id.get(), name, &mut problems)
    });

    ListenerSummary {
        id: cfg.id,
        name: cfg.name.clone(),
        activated_at: listener.activated_at,
        devices: device_refs,
        variables: variable_refs,
        advanced_mode: cfg.advanced_mode,
        filter_logic: cfg.filter_logic,
        state_filter: cfg.state_filter.iter().cloned().collect(),
        comm_enabled_watch: cfg.comm_enabled_watch,
        save_target,
        save_value_kind: cfg.save_value_kind,
        problems,
    }
}

fn resolve(
    cfg: &ListenerConfig,
    kind: ObjectKind,
    id: u64,
    name: Result<String, HostError>,
    problems: &mut Vec<ListenerError>,
) -> ObjectRef {
    let name = match name {
        Ok(name) => Some(name),
        Err(HostError::NotFound { .. }) => {
            let err: ListenerError = ExecutionError::MissingReferencedObject {
                listener: cfg.id,
                kind,
                id,
            }
            .into();
            error!("listener \"{}\": {err}", cfg.name);
            problems.push(err);
            None
        }
        Err(err) => {
            error!("listener \"{}\": reading {kind} {id}: {err}", cfg.name);
            problems.push(err.into());
            None
        }
    };
    ObjectRef { kind, id, name }
}
