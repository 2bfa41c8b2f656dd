//! Compiler settings.

use serde::{Deserialize, Serialize};

/// Operation compiler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Basis directions whose summed squared weight does not exceed this are dropped
    #[serde(default = "default_sparsity_tolerance")]
    pub sparsity_tolerance: f64,

    /// Hilbert dimension for subsystems that no basis or operation pins down
    #[serde(default)]
    pub default_dim_hilbert: Option<usize>,
}

fn default_sparsity_tolerance() -> f64 {
    1e-16
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            sparsity_tolerance: default_sparsity_tolerance(),
            default_dim_hilbert: None,
        }
    }
}

impl CompilerConfig {
    /// Check the settings; returns a description of the first bad field.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.sparsity_tolerance >= 0.0 && self.sparsity_tolerance.is_finite()) {
            return Err(format!(
                "sparsity_tolerance must be a finite non-negative number, got {}",
                self.sparsity_tolerance
            ));
        }
        if self.default_dim_hilbert == Some(0) {
            return Err("default_dim_hilbert must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.sparsity_tolerance, 1e-16);
        assert_eq!(config.default_dim_hilbert, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_nan_tolerance() {
        let config = CompilerConfig {
            sparsity_tolerance: f64::NAN,
            ..CompilerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_dimension() {
        let config = CompilerConfig {
            default_dim_hilbert: Some(0),
            ..CompilerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
