//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Density tensor engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Maximum number of constant arrays kept uploaded per tensor instance
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Traces at or below this value are not renormalized
    #[serde(default = "default_renormalize_threshold")]
    pub renormalize_threshold: f64,

    /// Upper bound on output coordinates computed by one thread group
    #[serde(default = "default_max_threads_per_group")]
    pub max_threads_per_group: usize,

    /// Upper bound on spectator slices batched per group for single-axis contractions
    #[serde(default = "default_max_spectators_single")]
    pub max_spectators_single: usize,

    /// Keep the work buffer at its current capacity when a projection shrinks the state
    #[serde(default = "default_true")]
    pub lazy_alloc: bool,
}

fn default_cache_capacity() -> usize {
    256
}

fn default_renormalize_threshold() -> f64 {
    1e-8
}

fn default_max_threads_per_group() -> usize {
    256
}

fn default_max_spectators_single() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            cache_capacity: default_cache_capacity(),
            renormalize_threshold: default_renormalize_threshold(),
            max_threads_per_group: default_max_threads_per_group(),
            max_spectators_single: default_max_spectators_single(),
            lazy_alloc: default_true(),
        }
    }
}

impl StateConfig {
    /// Check that every knob is usable; returns a description of the first
    /// offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }
        if !(self.renormalize_threshold >= 0.0 && self.renormalize_threshold.is_finite()) {
            return Err(format!(
                "renormalize_threshold must be a finite non-negative number, got {}",
                self.renormalize_threshold
            ));
        }
        if self.max_threads_per_group == 0 {
            return Err("max_threads_per_group must be greater than 0".to_string());
        }
        if self.max_spectators_single == 0 {
            return Err("max_spectators_single must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StateConfig::default();
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.max_threads_per_group, 256);
        assert!(config.lazy_alloc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = StateConfig {
            cache_capacity: 0,
            ..StateConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_negative_threshold() {
        let config = StateConfig {
            renormalize_threshold: -1.0,
            ..StateConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
