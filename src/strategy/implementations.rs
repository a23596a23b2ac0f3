// src/strategy/implementations.rs

use nalgebra::DMatrix;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Poisson, StandardNormal};

use crate::model::lp::LinearExpr;
use crate::model::store::StoreModel;
use crate::strategy::traits::{
    DemandDistribution, DemandMatrix, ObjectiveContext, ObjectiveFunction, ScenarioSampler,
};

/// Expected demand per product once the price effect is applied:
/// `demand_parameters[p] - demand_scaling * price[p]`.
fn price_adjusted_means(store: &StoreModel, prices: &[f64]) -> Vec<f64> {
    store
        .demand_parameters()
        .iter()
        .zip(prices)
        .map(|(base, price)| base - store.demand_scaling() * price)
        .collect()
}

// =========================================================================
// 1. Additive Normal Noise (default)
// =========================================================================

/// Linear price decay plus independent standard-normal noise per
/// (product, scenario), clipped at zero and rounded.
#[derive(Debug, Clone, Default)]
pub struct NormalDemand;

impl NormalDemand {
    pub fn new() -> Self {
        Self
    }
}

struct NormalSampler {
    means: Vec<f64>,
}

impl ScenarioSampler for NormalSampler {
    fn draw(&self, n_scenarios: usize, rng: &mut dyn RngCore) -> DemandMatrix {
        let mut demand = DMatrix::zeros(self.means.len(), n_scenarios);
        for (p, mean) in self.means.iter().enumerate() {
            for s in 0..n_scenarios {
                let noise: f64 = rng.sample(StandardNormal);
                let val = (mean + noise).max(0.0).round();
                demand[(p, s)] = val as u32;
            }
        }
        demand
    }
}

impl DemandDistribution for NormalDemand {
    fn sampler(&self, store: &StoreModel, prices: &[f64]) -> Box<dyn ScenarioSampler> {
        Box::new(NormalSampler {
            means: price_adjusted_means(store, prices),
        })
    }
}

// =========================================================================
// 2. Poisson Arrivals
// =========================================================================

/// Poisson demand with the same price-adjusted mean as [`NormalDemand`].
/// Products whose mean is not positive get zero demand.
#[derive(Debug, Clone, Default)]
pub struct PoissonDemand;

impl PoissonDemand {
    pub fn new() -> Self {
        Self
    }
}

struct PoissonSampler {
    laws: Vec<Option<Poisson<f64>>>,
}

impl ScenarioSampler for PoissonSampler {
    fn draw(&self, n_scenarios: usize, rng: &mut dyn RngCore) -> DemandMatrix {
        let mut demand = DMatrix::zeros(self.laws.len(), n_scenarios);
        for (p, law) in self.laws.iter().enumerate() {
            let Some(law) = law else { continue };
            for s in 0..n_scenarios {
                let val: f64 = law.sample(rng);
                demand[(p, s)] = val as u32;
            }
        }
        demand
    }
}

impl DemandDistribution for PoissonDemand {
    fn sampler(&self, store: &StoreModel, prices: &[f64]) -> Box<dyn ScenarioSampler> {
        let laws = price_adjusted_means(store, prices)
            .into_iter()
            .map(|mean| if mean > 0.0 { Poisson::new(mean).ok() } else { None })
            .collect();
        Box::new(PoissonSampler { laws })
    }
}

// =========================================================================
// 3. Expected Profit (default objective)
// =========================================================================

/// `-sum(cost[i] * x[i]) + probability * sum(price[p] * y[p, s])`
#[derive(Debug, Clone, Default)]
pub struct ExpectedProfit;

impl ObjectiveFunction for ExpectedProfit {
    fn build(&self, ctx: &ObjectiveContext<'_>) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for (i, x) in ctx.vars.x.iter().enumerate() {
            expr.add_term(*x, -ctx.store.costs()[i]);
        }
        for (p, price) in ctx.prices.iter().enumerate() {
            for s in 0..ctx.vars.n_scenarios {
                expr.add_term(ctx.vars.y(p, s), ctx.probability * price);
            }
        }
        expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::store::fixtures::{single_item_store, two_product_store};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normal_demand_is_non_negative_integer() {
        let store = two_product_store();
        // Prices far above the demand intercept push most draws to zero.
        let sampler = NormalDemand::new().sampler(&store, &[200.0, 5.0]);
        let mut rng = StdRng::seed_from_u64(7);
        let demand = sampler.draw(50, &mut rng);
        assert_eq!(demand.shape(), (2, 50));
        assert!(demand.row(0).iter().all(|d| *d == 0));
        assert!(demand.row(1).iter().any(|d| *d > 0));
    }

    #[test]
    fn test_normal_demand_centres_on_price_adjusted_mean() {
        let store = single_item_store();
        let sampler = NormalDemand::new().sampler(&store, &[15.0]);
        let mut rng = StdRng::seed_from_u64(11);
        let demand = sampler.draw(4000, &mut rng);
        let mean = demand.iter().map(|d| *d as f64).sum::<f64>() / 4000.0;
        let expected = 10.0 + 0.45 * 5.0 - 0.45 * 15.0;
        assert!((mean - expected).abs() < 0.1, "mean {mean} vs {expected}");
    }

    #[test]
    fn test_poisson_zero_mean_gives_zero_demand() {
        let store = single_item_store();
        let sampler = PoissonDemand::new().sampler(&store, &[1000.0]);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(sampler.draw(20, &mut rng).iter().all(|d| *d == 0));
    }
}
