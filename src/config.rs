//! Engine configuration.

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{ListenerError, ListenerResult, ValidationError};

/// Schema version stamped on migrated listener configurations.
pub const CURRENT_SCHEMA_VERSION: &str = "4.0";

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Version listener configurations are migrated to.
    pub schema_version: String,
    /// Max queued change events before `ChangeFeed::deliver` blocks.
    pub feed_queue_capacity: usize,
    /// Log per-decision debug output.
    pub show_debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            feed_queue_capacity: 1024,
            show_debug_info: false,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON. Absent keys take their defaults.
    pub fn from_json(s: &str) -> ListenerResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| ListenerError::internal(format!("deserialize engine config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects an empty schema version and a zero queue capacity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "schema_version".to_string(),
            });
        }
        if self.feed_queue_capacity == 0 {
            return Err(ValidationError::InvalidField {
                field: "feed_queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Log level implied by `show_debug_info`.
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if self.show_debug_info {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
