// src/simulation/engine.rs

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{AtoError, Result};
use crate::io::demand::{rng_from_seed, DemandSampler};
use crate::model::lp::{Constraint, LinearExpr, LinearModel, ScopedConstraints, Sense, VarId, VarKind};
use crate::model::store::{StoreModel, StoreParams};
use crate::solver::{MicroLpSolver, SolveStatus, Solver};
use crate::strategy::implementations::ExpectedProfit;
use crate::strategy::traits::{ObjectiveContext, ObjectiveFunction, ScenarioSimulation};

pub const DEFAULT_OBJECTIVE: &str = "default";

/// Decision variables of the scenario model.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationVars {
    /// Production quantity per item (integer).
    pub x: Vec<VarId>,
    /// Sales per (product, scenario), row-major by product.
    pub y: Vec<VarId>,
    pub n_scenarios: usize,
}

impl AllocationVars {
    pub fn y(&self, product: usize, scenario: usize) -> VarId {
        self.y[product * self.n_scenarios + scenario]
    }
}

/// Variables plus the price/demand independent constraints for one
/// scenario count. Never resized: a new count means a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioModel {
    n_scenarios: usize,
    probability: f64,
    lp: LinearModel,
    vars: AllocationVars,
}

impl ScenarioModel {
    pub fn build(store: &StoreModel, n_scenarios: usize) -> Result<Self> {
        if n_scenarios == 0 {
            return Err(AtoError::config("n_scenarios must be > 0"));
        }

        let mut lp = LinearModel::new("ATO");
        let x = lp.add_variables("x", store.n_items(), VarKind::Integer, 0.0);
        let y = lp.add_variables(
            "y",
            store.n_products() * n_scenarios,
            VarKind::Continuous,
            0.0,
        );
        let vars = AllocationVars { x, y, n_scenarios };

        // Per item and scenario: components consumed by sales <= produced.
        let connection = store.connection();
        let mut bom = Vec::with_capacity(store.n_items() * n_scenarios);
        for i in 0..store.n_items() {
            for s in 0..n_scenarios {
                let mut lhs = LinearExpr::new();
                for p in 0..store.n_products() {
                    lhs.add_term(vars.y(p, s), connection[(p, i)]);
                }
                lhs.add_term(vars.x[i], -1.0);
                bom.push(Constraint::leq(format!("components[{i},{s}]"), lhs, 0.0));
            }
        }
        lp.add_constraints("constraint_on_amount_of_components", bom);

        let process_times = store.process_times();
        let capacity = (0..store.n_machines()).map(|m| {
            let mut lhs = LinearExpr::new();
            for i in 0..store.n_items() {
                lhs.add_term(vars.x[i], process_times[(m, i)]);
            }
            Constraint::leq(
                format!("capacity[{m}]"),
                lhs,
                store.machine_capacities()[m],
            )
        });
        lp.add_constraints("production_capacity_constraint", capacity);

        Ok(Self {
            n_scenarios,
            probability: 1.0 / n_scenarios as f64,
            lp,
            vars,
        })
    }

    pub fn n_scenarios(&self) -> usize {
        self.n_scenarios
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn lp(&self) -> &LinearModel {
        &self.lp
    }

    pub fn vars(&self) -> &AllocationVars {
        &self.vars
    }
}

#[derive(Debug)]
struct RegisteredObjective {
    function: Box<dyn ObjectiveFunction>,
    sense: Sense,
}

/// Result of one evaluation, including the production plan when optimal.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: SolveStatus,
    /// `NaN` unless `status` is optimal.
    pub profit: f64,
    /// Production quantity per item; empty unless optimal.
    pub production: Vec<f64>,
}

/// Stochastic assemble-to-order allocation model.
///
/// Not reentrant: run parallel evaluations on separate instances.
#[derive(Debug)]
pub struct AtoModel {
    store: StoreModel,
    demand: DemandSampler,
    solver: Box<dyn Solver>,
    scenario: ScenarioModel,
    objectives: BTreeMap<String, RegisteredObjective>,
    current_objective: String,
}

impl AtoModel {
    pub fn new(store: StoreModel, n_scenarios: usize) -> Result<Self> {
        Self::with_parts(store, DemandSampler::new(), Box::new(MicroLpSolver::new()), n_scenarios)
    }

    pub fn with_parts(
        store: StoreModel,
        demand: DemandSampler,
        solver: Box<dyn Solver>,
        n_scenarios: usize,
    ) -> Result<Self> {
        debug!(n_scenarios, "initializing ATO model");
        let scenario = ScenarioModel::build(&store, n_scenarios)?;
        let mut model = Self {
            store,
            demand,
            solver,
            scenario,
            objectives: BTreeMap::new(),
            current_objective: DEFAULT_OBJECTIVE.to_string(),
        };
        model.register_objective(DEFAULT_OBJECTIVE, Box::new(ExpectedProfit), Sense::Maximize);
        Ok(model)
    }

    pub fn store(&self) -> &StoreModel {
        &self.store
    }

    pub fn demand(&self) -> &DemandSampler {
        &self.demand
    }

    pub fn demand_mut(&mut self) -> &mut DemandSampler {
        &mut self.demand
    }

    pub fn scenario_model(&self) -> &ScenarioModel {
        &self.scenario
    }

    pub fn n_scenarios(&self) -> usize {
        self.scenario.n_scenarios
    }

    /// Rebuilds variables and base constraints when `n_scenarios` changes;
    /// a no-op otherwise.
    pub fn set_n_scenarios(&mut self, n_scenarios: usize) -> Result<()> {
        if n_scenarios == self.scenario.n_scenarios {
            return Ok(());
        }
        debug!(
            from = self.scenario.n_scenarios,
            to = n_scenarios,
            "rebuilding scenario model"
        );
        self.scenario = ScenarioModel::build(&self.store, n_scenarios)?;
        Ok(())
    }

    /// Installs new store parameters and rebuilds the scenario model.
    /// Nothing changes if either step fails.
    pub fn set_store_params(&mut self, params: StoreParams) -> Result<()> {
        let mut store = self.store.clone();
        store.set_params(params)?;
        let scenario = ScenarioModel::build(&store, self.scenario.n_scenarios)?;
        self.store = store;
        self.scenario = scenario;
        Ok(())
    }

    /// Registering an existing name replaces it.
    pub fn register_objective(
        &mut self,
        name: impl Into<String>,
        function: Box<dyn ObjectiveFunction>,
        sense: Sense,
    ) {
        self.objectives
            .insert(name.into(), RegisteredObjective { function, sense });
    }

    pub fn set_objective(&mut self, name: &str) -> Result<()> {
        if !self.objectives.contains_key(name) {
            return Err(AtoError::NotFound {
                kind: "Objective",
                name: name.to_string(),
                available: self.objectives.keys().cloned().collect(),
            });
        }
        debug!(objective = name, "objective function set");
        self.current_objective = name.to_string();
        Ok(())
    }

    pub fn current_objective(&self) -> &str {
        &self.current_objective
    }

    /// Expected objective value for `prices`, or `NaN` when the solve has no optimum.
    pub fn evaluate(&mut self, prices: &[f64], seed: Option<u64>) -> Result<f64> {
        Ok(self.evaluate_detailed(prices, seed)?.profit)
    }

    /// Samples demand, caps sales by it and solves the allocation model.
    ///
    /// # Arguments
    /// * `prices` - One price per product.
    /// * `seed` - Fixes the demand draw; `None` draws from OS entropy.
    ///
    /// # Returns
    /// The solver status, the expected profit (`NaN` unless optimal) and the
    /// production plan. Only a wrong price count is an error.
    pub fn evaluate_detailed(&mut self, prices: &[f64], seed: Option<u64>) -> Result<Evaluation> {
        let n_products = self.store.n_products();
        if prices.len() != n_products {
            return Err(AtoError::DimensionMismatch {
                expected: n_products,
                actual: prices.len(),
            });
        }

        let n_scenarios = self.scenario.n_scenarios;
        let mut rng = rng_from_seed(seed);
        let demand = self
            .demand
            .sample_with_rng(&self.store, prices, n_scenarios, &mut rng)?;

        let objective = self
            .objectives
            .get(&self.current_objective)
            .ok_or_else(|| AtoError::NotFound {
                kind: "Objective",
                name: self.current_objective.clone(),
                available: self.objectives.keys().cloned().collect(),
            })?;
        let expr = objective.function.build(&ObjectiveContext {
            store: &self.store,
            vars: &self.scenario.vars,
            prices,
            probability: self.scenario.probability,
        });
        self.scenario.lp.set_objective(expr, objective.sense);

        let vars = &self.scenario.vars;
        let caps: Vec<Constraint> = (0..n_products)
            .flat_map(|p| (0..n_scenarios).map(move |s| (p, s)))
            .map(|(p, s)| {
                Constraint::leq(
                    format!("demand[{p},{s}]"),
                    LinearExpr::term(vars.y(p, s), 1.0),
                    f64::from(demand[(p, s)]),
                )
            })
            .collect();

        debug!(n_scenarios, "optimizing the model");
        let outcome = {
            let scoped = ScopedConstraints::attach(&mut self.scenario.lp, "constraint_on_demand", caps);
            self.solver.solve(scoped.model())
        };

        let evaluation = match (&outcome.status, outcome.objective_value) {
            (SolveStatus::Optimal, Some(profit)) => Evaluation {
                status: SolveStatus::Optimal,
                profit,
                production: self
                    .scenario
                    .vars
                    .x
                    .iter()
                    .map(|x| outcome.values.get(x.index()).copied().unwrap_or(f64::NAN))
                    .collect(),
            },
            (status, _) => {
                match status {
                    SolveStatus::Infeasible => {
                        warn!("model is infeasible; consider relaxing constraints")
                    }
                    SolveStatus::Unbounded => {
                        warn!("model is unbounded; check for missing constraints")
                    }
                    other => warn!(status = ?other, "optimization ended without an optimum"),
                }
                Evaluation {
                    status: status.clone(),
                    profit: f64::NAN,
                    production: Vec::new(),
                }
            }
        };
        Ok(evaluation)
    }
}

impl ScenarioSimulation for AtoModel {
    fn simulate(&mut self, prices: &[f64], seed: Option<u64>) -> Result<f64> {
        self.evaluate(prices, seed)
    }

    fn scenario_count(&self) -> usize {
        self.n_scenarios()
    }

    fn set_scenario_count(&mut self, n_scenarios: usize) -> Result<()> {
        self.set_n_scenarios(n_scenarios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::store::fixtures::{single_item_params, single_item_store, two_product_store};
    use crate::solver::SolveOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a fixed status and records how many rows it was shown.
    #[derive(Debug)]
    struct ScriptedSolver {
        status: SolveStatus,
        seen_rows: Arc<AtomicUsize>,
    }

    impl Solver for ScriptedSolver {
        fn solve(&self, model: &LinearModel) -> SolveOutcome {
            self.seen_rows
                .store(model.constraint_count(), Ordering::SeqCst);
            SolveOutcome::failed(self.status.clone())
        }
    }

    #[derive(Debug)]
    struct RevenueOnly;

    impl ObjectiveFunction for RevenueOnly {
        fn build(&self, ctx: &ObjectiveContext<'_>) -> LinearExpr {
            let mut expr = LinearExpr::new();
            for (p, price) in ctx.prices.iter().enumerate() {
                for s in 0..ctx.vars.n_scenarios {
                    expr.add_term(ctx.vars.y(p, s), ctx.probability * price);
                }
            }
            expr
        }
    }

    fn base_rows(model: &AtoModel) -> Vec<Constraint> {
        model.scenario_model().lp().constraints().cloned().collect()
    }

    #[test]
    fn test_single_item_profit_is_reproducible() {
        let mut ato = AtoModel::new(single_item_store(), 3).unwrap();
        for price in [10.0, 12.0, 15.0, 18.0, 20.0] {
            let first = ato.evaluate(&[price], Some(42)).unwrap();
            let second = ato.evaluate(&[price], Some(42)).unwrap();
            assert!(first.is_finite(), "price {price}");
            assert_eq!(first, second, "price {price}");
        }
    }

    #[test]
    fn test_single_item_profit_matches_enumeration() {
        let store = single_item_store();
        let demand = DemandSampler::new()
            .sample(&store, &[15.0], 3, Some(42))
            .unwrap();

        // One item, one product: y_s = min(x, d_s), so enumerate x.
        let best = (0..=100u32)
            .map(|x| {
                let sales: f64 = demand.iter().map(|d| f64::from((*d).min(x))).sum();
                -5.0 * f64::from(x) + 15.0 * sales / 3.0
            })
            .fold(f64::NEG_INFINITY, f64::max);

        let mut ato = AtoModel::new(store, 3).unwrap();
        let profit = ato.evaluate(&[15.0], Some(42)).unwrap();
        assert!((profit - best).abs() < 1e-6, "{profit} vs {best}");
    }

    #[test]
    fn test_evaluate_leaves_only_base_constraints() {
        let mut ato = AtoModel::new(two_product_store(), 8).unwrap();
        let before = base_rows(&ato);
        // 3 items x 8 scenarios BOM rows + 2 machine rows
        assert_eq!(before.len(), 3 * 8 + 2);

        let profit = ato.evaluate(&[30.0, 45.0], Some(5)).unwrap();
        assert!(profit.is_finite());
        assert_eq!(base_rows(&ato), before);
        assert_eq!(
            ato.scenario_model().lp().block_names(),
            vec![
                "constraint_on_amount_of_components",
                "production_capacity_constraint"
            ]
        );
    }

    #[test]
    fn test_non_optimal_status_yields_nan_and_cleans_up() {
        for status in [
            SolveStatus::Infeasible,
            SolveStatus::Unbounded,
            SolveStatus::Other("time limit".to_string()),
        ] {
            let seen = Arc::new(AtomicUsize::new(0));
            let solver = ScriptedSolver {
                status: status.clone(),
                seen_rows: Arc::clone(&seen),
            };
            let mut ato =
                AtoModel::with_parts(two_product_store(), DemandSampler::new(), Box::new(solver), 4)
                    .unwrap();
            let before = base_rows(&ato);

            let evaluation = ato.evaluate_detailed(&[30.0, 45.0], None).unwrap();
            assert!(evaluation.profit.is_nan());
            assert_eq!(evaluation.status, status);
            // The solver saw base rows plus 2 x 4 demand caps.
            assert_eq!(seen.load(Ordering::SeqCst), before.len() + 2 * 4);
            assert_eq!(base_rows(&ato), before);
        }
    }

    #[test]
    fn test_wrong_price_count_is_rejected() {
        let mut ato = AtoModel::new(two_product_store(), 2).unwrap();
        let err = ato.evaluate(&[30.0], None).unwrap_err();
        assert!(matches!(err, AtoError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_scenario_rebuild_is_idempotent() {
        let store = two_product_store();
        let a = ScenarioModel::build(&store, 6).unwrap();
        let b = ScenarioModel::build(&store, 6).unwrap();
        assert_eq!(a, b);

        let mut ato = AtoModel::new(store, 6).unwrap();
        ato.set_n_scenarios(6).unwrap();
        assert_eq!(ato.scenario_model(), &a);

        ato.set_n_scenarios(10).unwrap();
        assert_eq!(ato.scenario_model().vars().y.len(), 2 * 10);
        assert!((ato.scenario_model().probability() - 0.1).abs() < 1e-15);
        ato.set_n_scenarios(6).unwrap();
        assert_eq!(ato.scenario_model(), &a);
    }

    #[test]
    fn test_zero_scenarios_rejected() {
        let mut ato = AtoModel::new(single_item_store(), 2).unwrap();
        assert!(ato.set_n_scenarios(0).is_err());
        assert_eq!(ato.n_scenarios(), 2);
    }

    #[test]
    fn test_objective_registry() {
        let mut ato = AtoModel::new(single_item_store(), 3).unwrap();
        assert!(matches!(
            ato.set_objective("margin"),
            Err(AtoError::NotFound { .. })
        ));

        let profit = ato.evaluate(&[15.0], Some(9)).unwrap();
        ato.register_objective("revenue", Box::new(RevenueOnly), Sense::Maximize);
        ato.set_objective("revenue").unwrap();
        let revenue = ato.evaluate(&[15.0], Some(9)).unwrap();
        // Dropping the production cost can only raise the optimum.
        assert!(revenue >= profit);
        assert_eq!(ato.current_objective(), "revenue");
    }

    #[test]
    fn test_production_respects_capacity() {
        let mut params = single_item_params();
        params.machine_capacities = vec![2.0];
        let store = StoreModel::new(params, Default::default()).unwrap();
        let mut ato = AtoModel::new(store, 5).unwrap();
        let evaluation = ato.evaluate_detailed(&[12.0], Some(1)).unwrap();
        assert_eq!(evaluation.status, SolveStatus::Optimal);
        assert!(evaluation.production[0] <= 2.0 + 1e-9);
    }

    #[test]
    fn test_set_store_params_rebuilds() {
        let mut ato = AtoModel::new(two_product_store(), 4).unwrap();
        ato.set_store_params(single_item_params()).unwrap();
        assert_eq!(ato.store().n_products(), 1);
        assert_eq!(ato.scenario_model().vars().y.len(), 4);
        assert!(ato.evaluate(&[15.0], Some(3)).unwrap().is_finite());
    }
}
