//! Engine configuration.

use serde::{Deserialize, Serialize};

/// How the activations of one pass are fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringMode {
    /// Every activation computed at the start of the pass fires.
    #[default]
    Snapshot,
    /// Each activation is re-checked against the current store just before
    /// it fires and dropped if its match no longer holds. An earlier firing
    /// in the same pass can therefore cancel a later activation.
    Revalidate,
}

/// Inference loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Passes allowed before a session fails as non-terminating.
    pub max_passes: usize,
    /// When false, asserting a fact equal to a present one is a no-op.
    pub allow_duplicate_facts: bool,
    /// Firing discipline within a pass.
    pub firing_mode: FiringMode,
}

impl EngineConfig {
    /// Default pass limit.
    pub const DEFAULT_MAX_PASSES: usize = 100;

    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    #[must_use]
    pub fn with_duplicate_facts(mut self, allow: bool) -> Self {
        self.allow_duplicate_facts = allow;
        self
    }

    #[must_use]
    pub fn with_firing_mode(mut self, mode: FiringMode) -> Self {
        self.firing_mode = mode;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_passes: Self::DEFAULT_MAX_PASSES,
            allow_duplicate_facts: true,
            firing_mode: FiringMode::Snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_passes, 100);
        assert!(config.allow_duplicate_facts);
        assert_eq!(config.firing_mode, FiringMode::Snapshot);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"firing_mode": "revalidate"}"#).unwrap();
        assert_eq!(config, EngineConfig::default().with_firing_mode(FiringMode::Revalidate));
    }
}
