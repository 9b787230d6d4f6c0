//! Session configuration.

use crate::store::DEFAULT_PEN_HIT_THRESHOLD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("pen_hit_threshold must be a positive number, got {0}")]
    InvalidThreshold(f64),
    #[error("layer_bus_capacity must be at least 1")]
    ZeroCapacity,
}

/// Tunables for a [`Session`](crate::session::Session). Every field has a
/// default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Distance in pixels within which a pen stroke counts as hit.
    pub pen_hit_threshold: f64,
    /// Maximum number of undo steps kept. `None` is unbounded.
    pub history_limit: Option<usize>,
    /// Local storage key for the hidden map.
    pub hidden_layers_key: String,
    /// Local storage key for the locked map.
    pub locked_layers_key: String,
    /// Buffered updates per tab on the layer bus.
    pub layer_bus_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pen_hit_threshold: DEFAULT_PEN_HIT_THRESHOLD,
            history_limit: None,
            hidden_layers_key: "hiddenLayers".to_string(),
            locked_layers_key: "lockedLayers".to_string(),
            layer_bus_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pen_hit_threshold.is_finite() && self.pen_hit_threshold > 0.0) {
            return Err(ConfigError::InvalidThreshold(self.pen_hit_threshold));
        }
        if self.layer_bus_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
