// src/io/demand.rs

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::error::{AtoError, Result};
use crate::model::store::StoreModel;
use crate::strategy::implementations::{NormalDemand, PoissonDemand};
use crate::strategy::traits::{DemandDistribution, DemandMatrix};

pub const DEFAULT_DISTRIBUTION: &str = "default";
pub const POISSON_DISTRIBUTION: &str = "poisson";

/// Seeded generator when a seed is given, OS entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Registry of named demand distributions with one active entry.
#[derive(Debug)]
pub struct DemandSampler {
    distributions: BTreeMap<String, Box<dyn DemandDistribution>>,
    active: String,
}

impl Default for DemandSampler {
    fn default() -> Self {
        let mut sampler = Self {
            distributions: BTreeMap::new(),
            active: DEFAULT_DISTRIBUTION.to_string(),
        };
        sampler.register(DEFAULT_DISTRIBUTION, Box::new(NormalDemand::new()));
        sampler.register(POISSON_DISTRIBUTION, Box::new(PoissonDemand::new()));
        sampler
    }
}

impl DemandSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering an existing name replaces it.
    pub fn register(&mut self, name: impl Into<String>, distribution: Box<dyn DemandDistribution>) {
        self.distributions.insert(name.into(), distribution);
    }

    pub fn select(&mut self, name: &str) -> Result<()> {
        if !self.distributions.contains_key(name) {
            return Err(AtoError::NotFound {
                kind: "Distribution",
                name: name.to_string(),
                available: self.registered(),
            });
        }
        debug!(distribution = name, "demand distribution selected");
        self.active = name.to_string();
        Ok(())
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn registered(&self) -> Vec<String> {
        self.distributions.keys().cloned().collect()
    }

    pub fn sample(
        &self,
        store: &StoreModel,
        prices: &[f64],
        n_scenarios: usize,
        seed: Option<u64>,
    ) -> Result<DemandMatrix> {
        let mut rng = rng_from_seed(seed);
        self.sample_with_rng(store, prices, n_scenarios, &mut rng)
    }

    pub fn sample_with_rng(
        &self,
        store: &StoreModel,
        prices: &[f64],
        n_scenarios: usize,
        rng: &mut dyn RngCore,
    ) -> Result<DemandMatrix> {
        if prices.len() != store.n_products() {
            return Err(AtoError::DimensionMismatch {
                expected: store.n_products(),
                actual: prices.len(),
            });
        }
        let distribution = self
            .distributions
            .get(&self.active)
            .ok_or_else(|| AtoError::NotFound {
                kind: "Distribution",
                name: self.active.clone(),
                available: self.registered(),
            })?;
        Ok(distribution.sampler(store, prices).draw(n_scenarios, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::store::fixtures::two_product_store;
    use crate::strategy::traits::ScenarioSampler;
    use nalgebra::DMatrix;

    #[derive(Debug)]
    struct FixedDemand(u32);

    struct FixedSampler(usize, u32);

    impl ScenarioSampler for FixedSampler {
        fn draw(&self, n_scenarios: usize, _rng: &mut dyn RngCore) -> DemandMatrix {
            DMatrix::from_element(self.0, n_scenarios, self.1)
        }
    }

    impl DemandDistribution for FixedDemand {
        fn sampler(&self, store: &StoreModel, _prices: &[f64]) -> Box<dyn ScenarioSampler> {
            Box::new(FixedSampler(store.n_products(), self.0))
        }
    }

    #[test]
    fn test_same_seed_same_matrix() {
        let store = two_product_store();
        let sampler = DemandSampler::new();
        let a = sampler.sample(&store, &[30.0, 40.0], 25, Some(42)).unwrap();
        let b = sampler.sample(&store, &[30.0, 40.0], 25, Some(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), (2, 25));
    }

    #[test]
    fn test_unseeded_draws_differ() {
        let store = two_product_store();
        let sampler = DemandSampler::new();
        let a = sampler.sample(&store, &[30.0, 40.0], 200, None).unwrap();
        let b = sampler.sample(&store, &[30.0, 40.0], 200, None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_price_count() {
        let store = two_product_store();
        let err = DemandSampler::new()
            .sample(&store, &[30.0], 5, Some(1))
            .unwrap_err();
        assert!(matches!(
            err,
            AtoError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_select_unknown_lists_registered() {
        let mut sampler = DemandSampler::new();
        match sampler.select("lognormal") {
            Err(AtoError::NotFound { available, .. }) => {
                assert_eq!(available, vec!["default".to_string(), "poisson".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sampler.active(), DEFAULT_DISTRIBUTION);
    }

    #[test]
    fn test_custom_distribution() {
        let store = two_product_store();
        let mut sampler = DemandSampler::new();
        sampler.register("fixed", Box::new(FixedDemand(4)));
        sampler.select("fixed").unwrap();
        let demand = sampler.sample(&store, &[1.0, 2.0], 3, None).unwrap();
        assert!(demand.iter().all(|d| *d == 4));
    }
}
