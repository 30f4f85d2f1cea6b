//! Read-only host context injected into each sprite

use crate::layer::LayerId;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;

/// Preference: commit history on stroke release instead of after the debounce
pub const PREF_REDUCED_MEMORY: &str = "reduced_memory";

/// What the engine may ask of its host
pub trait EngineContext: Send + Sync {
    /// Color new paint is applied with
    fn active_color(&self) -> Rgba<u8>;

    /// Named boolean preference; unknown names read as false
    fn preference(&self, name: &str) -> bool;

    /// Pixels of another layer to clone from, if the host wants to offer them
    fn clone_source_pixels(&self, _layer: LayerId) -> Option<RgbaImage> {
        None
    }
}

/// Fixed-value context, enough for headless hosts and tests
#[derive(Debug, Clone)]
pub struct StaticContext {
    pub color: Rgba<u8>,
    pub preferences: HashMap<String, bool>,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            preferences: HashMap::new(),
        }
    }
}

impl StaticContext {
    pub fn new(color: Rgba<u8>) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn with_preference(mut self, name: &str, value: bool) -> Self {
        self.preferences.insert(name.to_string(), value);
        self
    }
}

impl EngineContext for StaticContext {
    fn active_color(&self) -> Rgba<u8> {
        self.color
    }

    fn preference(&self, name: &str) -> bool {
        self.preferences.get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_preference_is_false() {
        let context = StaticContext::default().with_preference(PREF_REDUCED_MEMORY, true);
        assert!(context.preference(PREF_REDUCED_MEMORY));
        assert!(!context.preference("something_else"));
        assert!(context.clone_source_pixels(LayerId(1)).is_none());
    }
}
