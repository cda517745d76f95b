//! Listener dispatcher.
//!
//! The dispatcher owns the registry and is the target of both the host's
//! change-feed callbacks and its listener lifecycle callbacks. For every
//! update it evaluates each registered listener exactly once against a
//! registry snapshot; for every fire it attempts the save side effect and
//! then requests the listener's action. Failures are scoped to one listener:
//! they are logged, collected in the [`DispatchReport`] and never stop the
//! remaining listeners or later events.

use std::sync::Arc;

use log::{debug, error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{ExecutionError, ListenerError, ListenerResult};
use crate::host::{ActionSink, HostError, VariableStore};
use crate::ids::ListenerId;
use crate::listener::config::{ListenerConfig, Props, RawListenerConfig, SaveValueKind};
use crate::listener::matcher::{evaluate_device_update, evaluate_variable_update, Fire, FireDecision};
use crate::listener::migrate::migrate;
use crate::listener::registry::{Listener, Registry};
use crate::object::{check_same_object, DeviceSnapshot, ObjectKind, Snapshot, VariableSnapshot};

/// Result of activating a listener.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub listener_id: ListenerId,
    /// Whether an earlier configuration of the same listener was replaced.
    pub replaced: bool,
    /// Migrated props the host should persist; `None` when nothing changed.
    pub migrated_props: Option<Props>,
    /// Obsolete-configuration condition to surface to the operator.
    pub obsolete: Option<ListenerError>,
}

/// Outcome of dispatching one update event.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    /// Correlates log lines of one dispatch pass.
    pub event_id: Uuid,
    /// Listeners whose action was requested, in evaluation order.
    pub fired: Vec<ListenerId>,
    /// Per-listener errors (failed saves and the like).
    pub errors: Vec<ListenerError>,
}

impl DispatchReport {
    fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            fired: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Whether `listener` fired during this pass.
    #[must_use]
    pub fn has_fired(&self, listener: ListenerId) -> bool {
        self.fired.contains(&listener)
    }
}

/// Routes object updates to listeners.
pub struct Dispatcher {
    registry: Registry,
    variables: Arc<dyn VariableStore>,
    actions: Arc<dyn ActionSink>,
    schema_version: String,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with an empty registry.
    pub fn new(
        cfg: &EngineConfig,
        variables: Arc<dyn VariableStore>,
        actions: Arc<dyn ActionSink>,
    ) -> Self {
        Self {
            registry: Registry::new(),
            variables,
            actions,
            schema_version: cfg.schema_version.clone(),
        }
    }

    /// The listener registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Migrates `raw` and registers it, replacing any earlier configuration
    /// of the same listener.
    ///
    /// If `raw` cannot be migrated, any earlier configuration of the listener
    /// is unregistered before the error is returned.
    pub fn activate(&self, raw: &RawListenerConfig) -> ListenerResult<Activation> {
        let migration = match migrate(raw, &self.schema_version) {
            Ok(migration) => migration,
            Err(err) => {
                if self.registry.remove(raw.id)?.is_some() {
                    error!("deactivated listener \"{}\" ({}): {err}", raw.name, raw.id);
                }
                return Err(err);
            }
        };
        let obsolete = migration.obsolete_error();
        let migrated_props = migration.changed.then_some(migration.props);
        let replaced = self
            .registry
            .insert(Listener::new(migration.config))?
            .is_some();

        info!(
            "{} listener \"{}\" ({})",
            if replaced { "reactivated" } else { "activated" },
            raw.name,
            raw.id
        );

        Ok(Activation {
            listener_id: raw.id,
            replaced,
            migrated_props,
            obsolete,
        })
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn deactivate(&self, id: ListenerId) -> ListenerResult<bool> {
        let removed = self.registry.remove(id)?;
        if let Some(listener) = &removed {
            info!("deactivated listener \"{}\" ({id})", listener.config.name);
        }
        Ok(removed.is_some())
    }

    /// All registered listeners, ordered by id.
    pub fn listeners(&self) -> ListenerResult<Vec<Arc<Listener>>> {
        let snapshot = self.registry.snapshot()?;
        let mut out: Vec<Arc<Listener>> = snapshot.values().cloned().collect();
        out.sort_by_key(|listener| listener.id());
        Ok(out)
    }

    /// Feed callback for a device update.
    pub fn on_device_updated(&self, old: &DeviceSnapshot, new: &DeviceSnapshot) -> DispatchReport {
        self.dispatch(old, new, evaluate_device_update)
    }

    /// Feed callback for a variable update.
    pub fn on_variable_updated(&self, old: &VariableSnapshot, new: &VariableSnapshot) -> DispatchReport {
        self.dispatch(old, new, evaluate_variable_update)
    }

    fn dispatch<T, F>(&self, old: &T, new: &T, evaluate: F) -> DispatchReport
    where
        T: Snapshot,
        F: Fn(&ListenerConfig, &T, &T) -> FireDecision,
    {
        let mut report = DispatchReport::new();

        if let Err(err) = check_same_object(old, new) {
            error!("[{}] dropping update: {err}", report.event_id);
            report.errors.push(err.into());
            return report;
        }

        let snapshot = match self.registry.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!("[{}] registry unavailable: {err}", report.event_id);
                report.errors.push(err);
                return report;
            }
        };

        let mut listeners: Vec<&Arc<Listener>> = snapshot.values().collect();
        listeners.sort_by_key(|listener| listener.id());

        for listener in listeners {
            let cfg: &ListenerConfig = &listener.config;
            let FireDecision::Fire(fire) = evaluate(cfg, old, new) else {
                continue;
            };

            debug!(
                "[{}] listener \"{}\" ({}) fired by {} \"{}\" ({}): {:?}",
                report.event_id,
                cfg.name,
                cfg.id,
                fire.trigger.kind,
                fire.trigger.name,
                fire.trigger.id,
                fire.cause
            );

            if let Err(err) = self.save_triggering_object(cfg, &fire) {
                error!("[{}] {err}", report.event_id);
                report.errors.push(err);
            }
            self.actions.fire_action(cfg.id);
            report.fired.push(cfg.id);
        }

        report
    }

    /// Writes the triggering object's name or id to the listener's save
    /// target, if it has one.
    ///
    /// Best effort: the caller requests the action whatever this returns.
    pub fn save_triggering_object(&self, cfg: &ListenerConfig, fire: &Fire) -> ListenerResult<()> {
        let Some(target) = cfg.save_target else {
            return Ok(());
        };

        // Writing to a watched variable would re-trigger this listener.
        if cfg.watches_variable(target) {
            return Err(ExecutionError::SelfReferentialSave {
                listener: cfg.id,
                variable: target,
            }
            .into());
        }

        let value = match cfg.save_value_kind {
            SaveValueKind::Name => fire.trigger.name.clone(),
            SaveValueKind::Id => fire.trigger.id.to_string(),
        };

        self.variables
            .write_variable(target, &value)
            .map_err(|err| match err {
                HostError::NotFound { .. } => ExecutionError::MissingReferencedObject {
                    listener: cfg.id,
                    kind: ObjectKind::Variable,
                    id: target.get(),
                },
                HostError::Backend(message) => ExecutionError::Host { message },
            })?;
        Ok(())
    }
}
