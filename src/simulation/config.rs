// src/simulation/config.rs

use serde::{Deserialize, Serialize};

use crate::error::{AtoError, Result};
use crate::model::store::{StoreParams, StoreProfile};

/// Settings of the in-sample stability check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// The interval has confidence `1 - alpha`.
    pub alpha: f64,
    pub initial_n_scenarios: usize,
    pub increment: usize,
    /// Paired differences required before the interval is consulted.
    pub min_samples: usize,
    /// Hard cap on trial rounds.
    pub max_rounds: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            initial_n_scenarios: 5,
            increment: 5,
            min_samples: 30,
            max_rounds: 500,
        }
    }
}

impl StabilityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(AtoError::config(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.initial_n_scenarios == 0 || self.increment == 0 {
            return Err(AtoError::config(
                "initial_n_scenarios and increment must be > 0",
            ));
        }
        if self.min_samples < 2 {
            return Err(AtoError::config("min_samples must be at least 2"));
        }
        if self.max_rounds < self.min_samples {
            return Err(AtoError::config("max_rounds must be >= min_samples"));
        }
        Ok(())
    }
}

/// Settings of the response-surface optimiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Closed integer range per product.
    pub ranges: Vec<(i64, i64)>,
    pub n_reps: usize,
    pub degree: u32,
    /// Target interval of the min-max scaler.
    pub feature_range: (f64, f64),
    pub max_iters: u64,
    pub sd_tolerance: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            n_reps: 10,
            degree: 2,
            feature_range: (-1.0, 1.0),
            max_iters: 1000,
            sd_tolerance: 1e-8,
        }
    }
}

impl SurfaceConfig {
    pub fn with_ranges(ranges: Vec<(i64, i64)>) -> Self {
        Self {
            ranges,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranges.is_empty() {
            return Err(AtoError::config("at least one price range is required"));
        }
        if let Some((lo, hi)) = self.ranges.iter().find(|(lo, hi)| lo > hi) {
            return Err(AtoError::config(format!(
                "price range ({lo}, {hi}) is empty"
            )));
        }
        if self.n_reps == 0 {
            return Err(AtoError::config("n_reps must be > 0"));
        }
        if self.degree == 0 {
            return Err(AtoError::config("degree must be >= 1"));
        }
        let (a, b) = self.feature_range;
        if !(a < b) {
            return Err(AtoError::config(format!(
                "feature_range ({a}, {b}) must be increasing"
            )));
        }
        if self.max_iters == 0 {
            return Err(AtoError::config("max_iters must be > 0"));
        }
        Ok(())
    }
}

fn default_n_scenarios() -> usize {
    100
}

/// Everything the binary needs for one optimisation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub store: StoreParams,
    #[serde(default)]
    pub profile: StoreProfile,
    #[serde(default = "default_n_scenarios")]
    pub n_scenarios: usize,
    pub surface: SurfaceConfig,
    /// Runs the stability check at every grid point when present.
    #[serde(default)]
    pub stability: Option<StabilityConfig>,
    #[serde(default)]
    pub report_path: Option<String>,
    /// Seed for the final verification solve.
    #[serde(default)]
    pub verification_seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        StabilityConfig::default().validate().unwrap();
        SurfaceConfig::with_ranges(vec![(25, 50), (35, 60)])
            .validate()
            .unwrap();
    }

    #[test]
    fn test_surface_rejects_bad_settings() {
        assert!(SurfaceConfig::default().validate().is_err());
        assert!(SurfaceConfig::with_ranges(vec![(10, 5)]).validate().is_err());
        let mut cfg = SurfaceConfig::with_ranges(vec![(1, 2)]);
        cfg.feature_range = (1.0, -1.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_stability_rejects_bad_settings() {
        let mut cfg = StabilityConfig::default();
        cfg.alpha = 1.0;
        assert!(cfg.validate().is_err());
        let mut cfg = StabilityConfig::default();
        cfg.max_rounds = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_surface_json_uses_defaults() {
        let cfg: SurfaceConfig = serde_json::from_str(r#"{"ranges": [[25, 50]]}"#).unwrap();
        assert_eq!(cfg.ranges, vec![(25, 50)]);
        assert_eq!(cfg.n_reps, 10);
        assert_eq!(cfg.degree, 2);
    }
}
