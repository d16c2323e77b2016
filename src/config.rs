//! Engine limits, loaded from the environment.
//!
//! Unset or unparseable variables fall back to the defaults:
//! `MAX_ORDERS_PER_PRICE` (100), `MAX_MAKERS_PER_MATCH` (100), `MAX_OVERFLOW_STEPS` (256).

use serde::{Deserialize, Serialize};

use crate::error::BookError;

pub const DEFAULT_MAX_ORDERS_PER_PRICE: usize = 100;
pub const DEFAULT_MAX_MAKERS_PER_MATCH: usize = 100;
pub const DEFAULT_MAX_OVERFLOW_STEPS: u32 = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Live orders a single price level may hold before new orders overflow to the next tick.
    pub max_orders_per_price: usize,
    /// Distinct makers one match may fill before the whole call is aborted.
    pub max_makers_per_match: usize,
    /// Tick steps the overflow walk may take before the order is rejected.
    pub max_overflow_steps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_orders_per_price: DEFAULT_MAX_ORDERS_PER_PRICE,
            max_makers_per_match: DEFAULT_MAX_MAKERS_PER_MATCH,
            max_overflow_steps: DEFAULT_MAX_OVERFLOW_STEPS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_orders_per_price: env_or("MAX_ORDERS_PER_PRICE", defaults.max_orders_per_price),
            max_makers_per_match: env_or("MAX_MAKERS_PER_MATCH", defaults.max_makers_per_match),
            max_overflow_steps: env_or("MAX_OVERFLOW_STEPS", defaults.max_overflow_steps),
        }
    }

    pub fn validate(&self) -> Result<(), BookError> {
        if self.max_orders_per_price == 0 {
            return Err(BookError::InvalidConfig {
                field: "max_orders_per_price",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_makers_per_match == 0 {
            return Err(BookError::InvalidConfig {
                field: "max_makers_per_match",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_limits_rejected() {
        let config = EngineConfig {
            max_orders_per_price: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_orders_per_price"));

        let config = EngineConfig {
            max_makers_per_match: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        assert_eq!(env_or("ITEM_LOB_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}
