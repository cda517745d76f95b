//! Listener configuration migration.
//!
//! Stored configurations may come from any earlier schema version. On every
//! activation whose stored version differs from the current one, the props
//! are brought up to date: legacy keys are renamed, absent fields are
//! backfilled with defaults, the legacy string filter is split into a list
//! and the version is stamped. The host persists the result only when
//! [`Migration::changed`] is set.

use log::warn;
use serde_json::Value as Json;

use crate::error::{ExecutionError, ListenerError, ListenerResult};
use crate::listener::config::{keys, parse_bool, split_legacy_filter, ListenerConfig, Props, RawListenerConfig};

/// Keys used by the first schema, mapped to their current names.
const LEGACY_RENAMES: &[(&str, &str)] = &[
    ("triggerDevices", keys::WATCHED_DEVICES),
    ("triggerVariables", keys::WATCHED_VARIABLES),
    (LEGACY_IGNORE_STATES, keys::STATE_FILTER),
    ("version", keys::SCHEMA_VERSION),
];

const LEGACY_IGNORE_STATES: &str = "ignoreStates";
const LEGACY_SAVE_BOOL: &str = "saveBool";
const LEGACY_SAVE_VAR: &str = "saveVar";

/// Fields the current schema requires that have no default.
const REQUIRED_WITHOUT_DEFAULT: &[&str] = &[keys::WATCHED_VARIABLES];

fn defaults() -> [(&'static str, Json); 7] {
    [
        (keys::WATCHED_DEVICES, Json::Array(Vec::new())),
        (keys::ADVANCED_MODE, Json::Bool(false)),
        (keys::FILTER_LOGIC, Json::String("ignore".to_string())),
        (keys::STATE_FILTER, Json::Array(Vec::new())),
        (keys::COMM_ENABLED_WATCH, Json::Bool(false)),
        (keys::SAVE_TARGET, Json::from(0)),
        (keys::SAVE_VALUE_KIND, Json::String("name".to_string())),
    ]
}

/// Outcome of migrating one listener configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// Typed configuration built from the migrated props.
    pub config: ListenerConfig,
    /// Migrated props, suitable for persisting back to the host.
    pub props: Props,
    /// Whether `props` differs from the stored props.
    pub changed: bool,
    /// Required fields still absent after backfill.
    pub obsolete_fields: Vec<String>,
}

impl Migration {
    /// The obsolete-configuration condition, if any, as a reportable error.
    #[must_use]
    pub fn obsolete_error(&self) -> Option<ListenerError> {
        if self.obsolete_fields.is_empty() {
            return None;
        }
        Some(
            ExecutionError::ConfigurationObsolete {
                listener: self.config.id,
                name: self.config.name.clone(),
                fields: self.obsolete_fields.clone(),
            }
            .into(),
        )
    }
}

/// Migrates `raw` to `current_version`.
///
/// A configuration already at `current_version` is returned as stored with
/// `changed = false`. Missing required fields never fail the migration; they
/// are listed in [`Migration::obsolete_fields`] and logged on every
/// activation until the operator edits the listener.
pub fn migrate(raw: &RawListenerConfig, current_version: &str) -> ListenerResult<Migration> {
    if raw.schema_version() == Some(current_version) {
        let config = ListenerConfig::from_props(raw.id, &raw.name, &raw.props)?;
        return Ok(report(Migration {
            config,
            props: raw.props.clone(),
            changed: false,
            obsolete_fields: missing_required(&raw.props),
        }));
    }

    let mut props = raw.props.clone();
    rename_legacy_keys(&mut props)?;
    let obsolete_fields = missing_required(&props);

    for (key, default) in defaults() {
        props.entry(key).or_insert(default);
    }

    if let Some(Json::String(legacy)) = props.get(keys::STATE_FILTER) {
        let repaired = split_legacy_filter(legacy)
            .into_iter()
            .map(Json::String)
            .collect();
        props.insert(keys::STATE_FILTER.to_string(), Json::Array(repaired));
    }

    props.insert(
        keys::SCHEMA_VERSION.to_string(),
        Json::String(current_version.to_string()),
    );

    let changed = props != raw.props;
    let config = ListenerConfig::from_props(raw.id, &raw.name, &props)?;

    Ok(report(Migration {
        config,
        props,
        changed,
        obsolete_fields,
    }))
}

fn missing_required(props: &Props) -> Vec<String> {
    REQUIRED_WITHOUT_DEFAULT
        .iter()
        .filter(|key| !props.contains_key(**key))
        .map(|key| (*key).to_string())
        .collect()
}

fn report(migration: Migration) -> Migration {
    if let Some(err) = migration.obsolete_error() {
        warn!("{err}");
    }
    migration
}

fn rename_legacy_keys(props: &mut Props) -> ListenerResult<()> {
    // The first schema always applied its state list as an ignore filter.
    if props.contains_key(LEGACY_IGNORE_STATES) && !props.contains_key(keys::ADVANCED_MODE) {
        props.insert(keys::ADVANCED_MODE.to_string(), Json::Bool(true));
    }

    for (legacy, current) in LEGACY_RENAMES {
        if let Some(value) = props.remove(*legacy) {
            props.entry(*current).or_insert(value);
        }
    }

    // The first schema kept an explicit "save?" checkbox next to the target.
    let save_bool = props.remove(LEGACY_SAVE_BOOL);
    let save_var = props.remove(LEGACY_SAVE_VAR);
    if props.contains_key(keys::SAVE_TARGET) {
        return Ok(());
    }
    let enabled = match &save_bool {
        Some(v) => parse_bool(LEGACY_SAVE_BOOL, v)?,
        None => false,
    };
    if enabled {
        if let Some(target) = save_var {
            props.insert(keys::SAVE_TARGET.to_string(), target);
        }
    }
    Ok(())
}
