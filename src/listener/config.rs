//! Listener configuration.
//!
//! The host stores each listener's settings as a loosely typed key/value map
//! ([`Props`]). [`ListenerConfig`] is the strongly typed, immutable form the
//! rest of the engine works with. It is built once per activation by the
//! migrator, so matching never has to second-guess missing or mistyped keys.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ValidationError;
use crate::ids::{DeviceId, ListenerId, VariableId};

/// Raw, host-decoded listener properties.
pub type Props = serde_json::Map<String, Json>;

/// Property keys of the current configuration schema.
#[allow(missing_docs)]
pub mod keys {
    pub const WATCHED_DEVICES: &str = "watchedDevices";
    pub const WATCHED_VARIABLES: &str = "watchedVariables";
    pub const ADVANCED_MODE: &str = "advancedMode";
    pub const FILTER_LOGIC: &str = "filterLogic";
    pub const STATE_FILTER: &str = "stateFilter";
    pub const COMM_ENABLED_WATCH: &str = "commEnabledWatch";
    pub const SAVE_TARGET: &str = "saveTarget";
    pub const SAVE_VALUE_KIND: &str = "saveValueKind";
    pub const SCHEMA_VERSION: &str = "schemaVersion";
}

/// How `state_filter` classifies a changed state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLogic {
    /// A change to a key *not* in the filter is significant.
    #[default]
    Ignore,
    /// A change to a key *in* the filter is significant.
    Require,
}

impl FilterLogic {
    /// Name used in host properties.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Require => "require",
        }
    }

    /// Whether a changed key is significant under this logic.
    #[must_use]
    pub fn is_significant(self, key: &str, filter: &BTreeSet<String>) -> bool {
        match self {
            Self::Ignore => !filter.contains(key),
            Self::Require => filter.contains(key),
        }
    }
}

impl FromStr for FilterLogic {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "require" => Ok(Self::Require),
            other => Err(invalid(keys::FILTER_LOGIC, format!("unknown filter logic '{other}'"))),
        }
    }
}

impl fmt::Display for FilterLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Representation written to the save target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveValueKind {
    /// The triggering object's name.
    #[default]
    Name,
    /// The triggering object's id, in decimal.
    Id,
}

impl SaveValueKind {
    /// Name used in host properties.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Id => "id",
        }
    }
}

impl FromStr for SaveValueKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "id" => Ok(Self::Id),
            other => Err(invalid(keys::SAVE_VALUE_KIND, format!("unknown save value kind '{other}'"))),
        }
    }
}

/// A listener configuration as delivered by the host, before migration.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListenerConfig {
    pub id: ListenerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub props: Props,
}

impl RawListenerConfig {
    /// Wraps host properties.
    pub fn new(id: ListenerId, name: impl Into<String>, props: Props) -> Self {
        Self {
            id,
            name: name.into(),
            props,
        }
    }

    /// Stored schema version, if any.
    #[must_use]
    pub fn schema_version(&self) -> Option<&str> {
        self.props.get(keys::SCHEMA_VERSION).and_then(Json::as_str)
    }
}

/// Validated, immutable configuration of one listener.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub id: ListenerId,
    pub name: String,
    pub watched_devices: BTreeSet<DeviceId>,
    pub watched_variables: BTreeSet<VariableId>,
    /// When false, any change to a device's state map fires.
    pub advanced_mode: bool,
    pub filter_logic: FilterLogic,
    pub state_filter: BTreeSet<String>,
    /// In advanced mode, an `enabled` flip alone also fires.
    pub comm_enabled_watch: bool,
    pub save_target: Option<VariableId>,
    pub save_value_kind: SaveValueKind,
    pub schema_version: String,
}

impl ListenerConfig {
    /// Creates a basic-mode listener that watches nothing.
    pub fn new(id: ListenerId, name: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            watched_devices: BTreeSet::new(),
            watched_variables: BTreeSet::new(),
            advanced_mode: false,
            filter_logic: FilterLogic::Ignore,
            state_filter: BTreeSet::new(),
            comm_enabled_watch: false,
            save_target: None,
            save_value_kind: SaveValueKind::Name,
            schema_version: schema_version.into(),
        }
    }

    /// Adds a watched device.
    #[must_use]
    pub fn watch_device(mut self, id: DeviceId) -> Self {
        self.watched_devices.insert(id);
        self
    }

    /// Adds a watched variable.
    #[must_use]
    pub fn watch_variable(mut self, id: VariableId) -> Self {
        self.watched_variables.insert(id);
        self
    }

    /// Switches to advanced mode with the given filter.
    #[must_use]
    pub fn advanced<I, S>(mut self, logic: FilterLogic, filter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.advanced_mode = true;
        self.filter_logic = logic;
        self.state_filter = filter.into_iter().map(Into::into).collect();
        self
    }

    /// Also fire on `enabled` flips (advanced mode only).
    #[must_use]
    pub fn watch_comm_enabled(mut self, watch: bool) -> Self {
        self.comm_enabled_watch = watch;
        self
    }

    /// Saves the triggering object's name or id to `target` on fire.
    #[must_use]
    pub fn save_to(mut self, target: VariableId, kind: SaveValueKind) -> Self {
        self.save_target = Some(target);
        self.save_value_kind = kind;
        self
    }

    /// Builds a configuration from host properties.
    ///
    /// Absent keys take their schema defaults; present keys must have a
    /// usable shape. Missing-field reporting is the migrator's job.
    pub fn from_props(id: ListenerId, name: &str, props: &Props) -> Result<Self, ValidationError> {
        let filter_logic = match props.get(keys::FILTER_LOGIC) {
            None | Some(Json::Null) => FilterLogic::default(),
            Some(Json::String(s)) => s.parse()?,
            Some(other) => return Err(invalid(keys::FILTER_LOGIC, expected("a string", other))),
        };
        let save_value_kind = match props.get(keys::SAVE_VALUE_KIND) {
            None | Some(Json::Null) => SaveValueKind::default(),
            Some(Json::String(s)) => s.parse()?,
            Some(other) => return Err(invalid(keys::SAVE_VALUE_KIND, expected("a string", other))),
        };
        let schema_version = match props.get(keys::SCHEMA_VERSION) {
            None | Some(Json::Null) => String::new(),
            Some(Json::String(s)) => s.clone(),
            Some(Json::Number(n)) => n.to_string(),
            Some(other) => return Err(invalid(keys::SCHEMA_VERSION, expected("a string", other))),
        };

        Ok(Self {
            id,
            name: name.to_string(),
            watched_devices: id_set(props, keys::WATCHED_DEVICES)?,
            watched_variables: id_set(props, keys::WATCHED_VARIABLES)?,
            advanced_mode: bool_field(props, keys::ADVANCED_MODE)?,
            filter_logic,
            state_filter: state_filter(props)?,
            comm_enabled_watch: bool_field(props, keys::COMM_ENABLED_WATCH)?,
            save_target: optional_id(props, keys::SAVE_TARGET)?,
            save_value_kind,
            schema_version,
        })
    }

    /// Whether this listener watches the device.
    #[must_use]
    pub fn watches_device(&self, id: DeviceId) -> bool {
        self.watched_devices.contains(&id)
    }

    /// Whether this listener watches the variable.
    #[must_use]
    pub fn watches_variable(&self, id: VariableId) -> bool {
        self.watched_variables.contains(&id)
    }
}

/// Checks the shape of one current-schema property.
///
/// Unknown keys are accepted; they are the host's business.
pub(crate) fn check_field(key: &str, value: &Json) -> Result<(), ValidationError> {
    let mut single = Props::new();
    single.insert(key.to_string(), value.clone());
    match key {
        keys::WATCHED_DEVICES => id_set::<DeviceId>(&single, key).map(drop),
        keys::WATCHED_VARIABLES => id_set::<VariableId>(&single, key).map(drop),
        keys::ADVANCED_MODE | keys::COMM_ENABLED_WATCH => bool_field(&single, key).map(drop),
        keys::STATE_FILTER => state_filter(&single).map(drop),
        keys::SAVE_TARGET => optional_id(&single, key).map(drop),
        keys::FILTER_LOGIC | keys::SAVE_VALUE_KIND | keys::SCHEMA_VERSION => {
            ListenerConfig::from_props(ListenerId::new(0), "", &single).map(drop)
        }
        _ => Ok(()),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn expected(what: &str, got: &Json) -> String {
    format!("expected {what}, got {got}")
}

pub(crate) fn parse_bool(field: &str, value: &Json) -> Result<bool, ValidationError> {
    match value {
        Json::Bool(b) => Ok(*b),
        Json::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            _ => Err(invalid(field, expected("a boolean", value))),
        },
        other => Err(invalid(field, expected("a boolean", other))),
    }
}

/// Parses a host id given as a JSON number or a numeric string.
/// Returns `None` for the "unset" encodings: null, empty string and 0.
pub(crate) fn parse_id(field: &str, value: &Json) -> Result<Option<u64>, ValidationError> {
    let raw = match value {
        Json::Null => return Ok(None),
        Json::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(field, expected("a non-negative integer id", value)))?,
        Json::String(s) if s.trim().is_empty() => return Ok(None),
        Json::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(field, expected("a numeric id", value)))?,
        other => return Err(invalid(field, expected("an id", other))),
    };
    Ok((raw != 0).then_some(raw))
}

fn bool_field(props: &Props, key: &str) -> Result<bool, ValidationError> {
    match props.get(key) {
        None | Some(Json::Null) => Ok(false),
        Some(v) => parse_bool(key, v),
    }
}

pub(crate) fn optional_id(props: &Props, key: &str) -> Result<Option<VariableId>, ValidationError> {
    match props.get(key) {
        None => Ok(None),
        Some(v) => Ok(parse_id(key, v)?.map(VariableId::new)),
    }
}

pub(crate) fn id_set<T: From<u64> + Ord>(props: &Props, key: &str) -> Result<BTreeSet<T>, ValidationError> {
    match props.get(key) {
        None | Some(Json::Null) => Ok(BTreeSet::new()),
        Some(Json::Array(items)) => {
            let mut out = BTreeSet::new();
            for item in items {
                if let Some(raw) = parse_id(key, item)? {
                    out.insert(T::from(raw));
                }
            }
            Ok(out)
        }
        Some(other) => Err(invalid(key, expected("a list of ids", other))),
    }
}

fn state_filter(props: &Props) -> Result<BTreeSet<String>, ValidationError> {
    match props.get(keys::STATE_FILTER) {
        None | Some(Json::Null) => Ok(BTreeSet::new()),
        Some(Json::String(s)) => Ok(split_legacy_filter(s)),
        Some(Json::Array(items)) => {
            let mut out = BTreeSet::new();
            for item in items {
                let Json::String(s) = item else {
                    return Err(invalid(keys::STATE_FILTER, expected("a list of state names", item)));
                };
                let s = s.trim();
                if !s.is_empty() {
                    out.insert(s.to_string());
                }
            }
            Ok(out)
        }
        Some(other) => Err(invalid(keys::STATE_FILTER, expected("a list of state names", other))),
    }
}

/// Splits a legacy delimited filter string.
///
/// Tokens are separated by whitespace; each loses one trailing comma and
/// empty tokens are dropped, so `"temperature, humidity,"` yields
/// `{"temperature", "humidity"}`.
#[must_use]
pub fn split_legacy_filter(s: &str) -> BTreeSet<String> {
    s.split_whitespace()
        .map(|token| token.strip_suffix(',').unwrap_or(token))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
