//! Reconciler configuration.
//!
//! Loaded from JSON; every field has a default so a partial file (or `{}`)
//! is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LobError, Result};
use crate::order::Size;

/// Multipliers used when inferring unseen liquidity from trade prints.
///
/// These are rough guesses, not derived from any model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Placeholder size per unit of volume traded at a price better than
    /// the book's best
    pub better_price_multiplier: Size,
    /// Placeholder size per unit of volume when a trade at the best price
    /// exceeds what rests there
    pub shortfall_multiplier: Size,
    /// Placeholder size per unit of total volume left behind a
    /// multi-level trade
    pub sweep_multiplier: Size,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            better_price_multiplier: 2,
            shortfall_multiplier: 3,
            sweep_multiplier: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartBookConfig {
    /// When false the leader is always the order-feed replica
    pub reconcile: bool,
    /// Publish an immutable copy of the leader after every message
    pub publish_leader: bool,
    pub inference: InferenceConfig,
}

impl Default for SmartBookConfig {
    fn default() -> Self {
        Self {
            reconcile: true,
            publish_leader: false,
            inference: InferenceConfig::default(),
        }
    }
}

impl SmartBookConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let inference = &self.inference;
        if inference.better_price_multiplier == 0
            || inference.shortfall_multiplier == 0
            || inference.sweep_multiplier == 0
        {
            return Err(LobError::Config(
                "inference multipliers must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SmartBookConfig::default();
        assert!(config.reconcile);
        assert!(!config.publish_leader);
        assert_eq!(config.inference.better_price_multiplier, 2);
        assert_eq!(config.inference.shortfall_multiplier, 3);
        assert_eq!(config.inference.sweep_multiplier, 2);
    }

    #[test]
    fn test_partial_json() {
        let config =
            SmartBookConfig::from_json_str(r#"{"reconcile": false, "inference": {"sweep_multiplier": 4}}"#)
                .unwrap();
        assert!(!config.reconcile);
        assert_eq!(config.inference.sweep_multiplier, 4);
        assert_eq!(config.inference.shortfall_multiplier, 3);

        assert_eq!(SmartBookConfig::from_json_str("{}").unwrap(), SmartBookConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            SmartBookConfig::from_json_str(r#"{"inference": {"shortfall_multiplier": 0}}"#),
            Err(LobError::Config(_))
        ));
        assert!(matches!(
            SmartBookConfig::from_json_str("not json"),
            Err(LobError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SmartBookConfig::from_json_file("/definitely/not/here.json"),
            Err(LobError::Io(_))
        ));
    }
}
