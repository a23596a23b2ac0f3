// src/strategy/traits.rs

use std::fmt::Debug;

use nalgebra::DMatrix;
use rand::RngCore;

use crate::error::Result;
use crate::model::lp::LinearExpr;
use crate::model::store::StoreModel;
use crate::simulation::engine::AllocationVars;

/// Demand realisations, shape (n_products, n_scenarios).
pub type DemandMatrix = DMatrix<u32>;

/// Draws scenario demand for one fixed price vector.
pub trait ScenarioSampler {
    fn draw(&self, n_scenarios: usize, rng: &mut dyn RngCore) -> DemandMatrix;
}

/// A named demand model: given the store and a price vector, produce a sampler.
///
/// `prices` has already been checked against `store.n_products()`.
pub trait DemandDistribution: Debug + Send + Sync {
    fn sampler(&self, store: &StoreModel, prices: &[f64]) -> Box<dyn ScenarioSampler>;
}

/// Everything an objective may read when it is rebuilt for a solve.
pub struct ObjectiveContext<'a> {
    pub store: &'a StoreModel,
    pub vars: &'a AllocationVars,
    pub prices: &'a [f64],
    /// Weight of a single scenario, `1 / n_scenarios`.
    pub probability: f64,
}

/// Builds the linear objective of the allocation model.
pub trait ObjectiveFunction: Debug + Send + Sync {
    fn build(&self, ctx: &ObjectiveContext<'_>) -> LinearExpr;
}

/// Anything that turns a price vector into a (noisy) profit estimate and
/// whose scenario count can be adjusted between calls.
pub trait ScenarioSimulation {
    /// Returns `f64::NAN` when the underlying solve had no optimum.
    fn simulate(&mut self, prices: &[f64], seed: Option<u64>) -> Result<f64>;

    fn scenario_count(&self) -> usize;

    fn set_scenario_count(&mut self, n_scenarios: usize) -> Result<()>;
}
