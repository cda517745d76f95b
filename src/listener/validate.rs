//! Edit-time configuration validation.
//!
//! The host runs this when the operator saves a listener, before the props
//! are stored. Unlike activation, which repairs what it can, validation
//! rejects the edit and returns one error per offending field so the host
//! can show them next to the right inputs.

use std::collections::BTreeSet;

use serde_json::Value as Json;

use crate::error::ValidationError;
use crate::ids::VariableId;
use crate::listener::config::{check_field, id_set, keys, optional_id, split_legacy_filter, Props};

/// Keys whose shape is checked.
const CHECKED_KEYS: &[&str] = &[
    keys::WATCHED_DEVICES,
    keys::WATCHED_VARIABLES,
    keys::ADVANCED_MODE,
    keys::FILTER_LOGIC,
    keys::STATE_FILTER,
    keys::COMM_ENABLED_WATCH,
    keys::SAVE_TARGET,
    keys::SAVE_VALUE_KIND,
];

/// Validates edited props and returns them ready to store.
///
/// On success the props carry `schema_version` and a string `stateFilter`
/// is normalized to a list. On failure every offending field is reported.
pub fn validate_props(props: &Props, schema_version: &str) -> Result<Props, Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = CHECKED_KEYS
        .iter()
        .filter_map(|key| props.get(*key).map(|value| check_field(key, value)))
        .filter_map(Result::err)
        .collect();

    if let Some(err) = self_referential_save(props) {
        errors.push(err);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut out = props.clone();
    if let Some(Json::String(filter)) = out.get(keys::STATE_FILTER) {
        let list = split_legacy_filter(filter).into_iter().map(Json::String).collect();
        out.insert(keys::STATE_FILTER.to_string(), Json::Array(list));
    }
    out.insert(
        keys::SCHEMA_VERSION.to_string(),
        Json::String(schema_version.to_string()),
    );
    Ok(out)
}

fn self_referential_save(props: &Props) -> Option<ValidationError> {
    let target = optional_id(props, keys::SAVE_TARGET).ok()??;
    let watched: BTreeSet<VariableId> = id_set(props, keys::WATCHED_VARIABLES).ok()?;
    watched.contains(&target).then(|| ValidationError::InvalidField {
        field: keys::SAVE_TARGET.to_string(),
        reason: "Can't save to a variable being monitored".to_string(),
    })
}
