//! Engine configuration
//!
//! Hosts usually ship this as JSON next to their own settings; every field
//! has a default so partial documents are fine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the paint pipeline and the history debounce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolution factor of the live preview surface (0 < scale <= 1)
    pub preview_scale: f64,
    /// Extra margin in surface pixels kept around stroke points when sizing the preview
    pub preview_padding: f64,
    /// Quiet period after the last edit before a history entry is committed
    pub snapshot_debounce_ms: u64,
    /// Debounce window used while the triggering stroke is still active
    pub snapshot_debounce_active_ms: u64,
    /// RGBA color of the selection outline overlay
    pub selection_outline: [u8; 4],
    /// RGBA color of the brush outline overlay
    pub brush_outline: [u8; 4],
    /// RGBA color of the active-layer border overlay
    pub active_border: [u8; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_scale: 0.5,
            preview_padding: 2.0,
            snapshot_debounce_ms: 500,
            snapshot_debounce_active_ms: 2_000,
            selection_outline: [0, 120, 255, 255],
            brush_outline: [40, 40, 40, 200],
            active_border: [0, 160, 255, 180],
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.preview_scale > 0.0 && self.preview_scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "preview_scale must be in (0, 1], got {}",
                self.preview_scale
            )));
        }
        if self.preview_padding < 0.0 {
            return Err(ConfigError::Invalid(
                "preview_padding must not be negative".to_string(),
            ));
        }
        if self.snapshot_debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_debounce_ms must be non-zero".to_string(),
            ));
        }
        if self.snapshot_debounce_active_ms < self.snapshot_debounce_ms {
            return Err(ConfigError::Invalid(
                "snapshot_debounce_active_ms must not be shorter than snapshot_debounce_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_debounce(&self) -> Duration {
        Duration::from_millis(self.snapshot_debounce_ms)
    }

    pub fn snapshot_debounce_active(&self) -> Duration {
        Duration::from_millis(self.snapshot_debounce_active_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<(), ConfigError> {
        let config = EngineConfig::from_json_str(r#"{ "preview_scale": 0.25 }"#)?;
        assert_eq!(config.preview_scale, 0.25);
        assert_eq!(config.snapshot_debounce_ms, 500);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_preview_scale() {
        let result = EngineConfig::from_json_str(r#"{ "preview_scale": 0.0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = EngineConfig::from_json_str(r#"{ "preview_scale": 2.0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_short_active_debounce() {
        let result = EngineConfig::from_json_str(
            r#"{ "snapshot_debounce_ms": 800, "snapshot_debounce_active_ms": 100 }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = EngineConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
