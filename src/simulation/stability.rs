// src/simulation/stability.rs

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::simulation::config::StabilityConfig;
use crate::strategy::stats::{confidence_interval, ConfidenceInterval};
use crate::strategy::traits::ScenarioSimulation;

/// Outcome of one in-sample stability check.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityReport {
    /// Scenario count configured before the check.
    pub baseline: usize,
    /// Last trial count, i.e. the count at which the rule stopped.
    pub required: usize,
    pub samples: usize,
    /// False when `max_rounds` ran out first.
    pub converged: bool,
    /// `baseline >= required`; the baseline is restored only in that case.
    pub sufficient: bool,
    pub interval: Option<ConfidenceInterval>,
}

/// Finds the scenario count at which two independent replicates at the same
/// prices stop differing significantly.
///
/// The rule declares stability as soon as the confidence interval of the
/// mean paired difference contains zero (after `min_samples` pairs). That is
/// a test of insignificance, not a proof of convergence.
#[derive(Debug, Clone)]
pub struct StabilityMonitor {
    config: StabilityConfig,
    phi: Vec<f64>,
}

impl StabilityMonitor {
    pub fn new(config: StabilityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            phi: Vec::new(),
        })
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Differences held right now; always zero between calls.
    pub fn pending_samples(&self) -> usize {
        self.phi.len()
    }

    fn keep_collecting(&self) -> bool {
        if self.phi.len() < self.config.min_samples {
            return true;
        }
        match confidence_interval(&self.phi, self.config.alpha) {
            Some(ci) => !ci.contains(0.0),
            None => true,
        }
    }

    /// Runs the sequential stability check at one price vector.
    ///
    /// # Arguments
    /// * `sim` - The simulation whose scenario count is probed and, when
    ///   sufficient, restored afterwards.
    /// * `prices` - One price per product, held fixed for every replicate.
    ///
    /// # Returns
    /// A [`StabilityReport`]. On error the scenario count is reset to the
    /// baseline before the error is returned.
    pub fn in_sample_stability<S>(&mut self, sim: &mut S, prices: &[f64]) -> Result<StabilityReport>
    where
        S: ScenarioSimulation + ?Sized,
    {
        let baseline = sim.scenario_count();
        self.phi.clear();
        let report = self.collect(sim, prices, baseline);
        self.phi.clear();
        if report.is_err() && sim.scenario_count() != baseline {
            if let Err(e) = sim.set_scenario_count(baseline) {
                warn!(baseline, error = %e, "could not restore the baseline scenario count");
            }
        }
        report
    }

    fn collect<S>(&mut self, sim: &mut S, prices: &[f64], baseline: usize) -> Result<StabilityReport>
    where
        S: ScenarioSimulation + ?Sized,
    {
        debug!("starting in-sample stability check");
        let mut n_scenarios = self.config.initial_n_scenarios;
        let mut rounds = 0;

        while self.keep_collecting() {
            if rounds == self.config.max_rounds {
                break;
            }
            sim.set_scenario_count(n_scenarios)?;
            let phi = sim.simulate(prices, None)? - sim.simulate(prices, None)?;
            if phi.is_finite() {
                self.phi.push(phi);
            } else {
                warn!(n_scenarios, "undefined replicate difference discarded");
            }
            n_scenarios += self.config.increment;
            rounds += 1;
        }

        let converged = !self.keep_collecting();
        // last trial value before the final increment
        let required = n_scenarios - self.config.increment;
        let interval = confidence_interval(&self.phi, self.config.alpha);

        if !converged {
            warn!(
                rounds,
                samples = self.phi.len(),
                "stability rule did not trigger within max_rounds"
            );
        }

        let sufficient = baseline >= required;
        if sufficient {
            info!(baseline, required, "initial number of scenarios is sufficient");
            sim.set_scenario_count(baseline)?;
        } else {
            warn!(
                baseline,
                required, "initial number of scenarios is insufficient for stability"
            );
        }

        Ok(StabilityReport {
            baseline,
            required,
            samples: self.phi.len(),
            converged,
            sufficient,
            interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtoError;
    use crate::model::store::fixtures::single_item_store;
    use crate::simulation::engine::AtoModel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    /// Noisy constant response; every second call can be shifted by `drift`.
    struct SyntheticSim {
        n_scenarios: usize,
        drift: f64,
        calls: usize,
        rng: StdRng,
        history: Vec<usize>,
    }

    impl SyntheticSim {
        fn new(n_scenarios: usize, drift: f64, seed: u64) -> Self {
            Self {
                n_scenarios,
                drift,
                calls: 0,
                rng: StdRng::seed_from_u64(seed),
                history: Vec::new(),
            }
        }
    }

    impl ScenarioSimulation for SyntheticSim {
        fn simulate(&mut self, _prices: &[f64], _seed: Option<u64>) -> Result<f64> {
            self.calls += 1;
            let noise: f64 = self.rng.sample(StandardNormal);
            let shift = if self.calls % 2 == 1 { self.drift } else { 0.0 };
            Ok(100.0 + shift + noise / (self.n_scenarios as f64).sqrt())
        }

        fn scenario_count(&self) -> usize {
            self.n_scenarios
        }

        fn set_scenario_count(&mut self, n_scenarios: usize) -> Result<()> {
            self.history.push(n_scenarios);
            self.n_scenarios = n_scenarios;
            Ok(())
        }
    }

    fn config(min_samples: usize, max_rounds: usize) -> StabilityConfig {
        StabilityConfig {
            alpha: 0.01,
            initial_n_scenarios: 5,
            increment: 5,
            min_samples,
            max_rounds,
        }
    }

    #[test]
    fn test_unbiased_replicates_stabilise() {
        let mut monitor = StabilityMonitor::new(config(30, 500)).unwrap();
        let mut sim = SyntheticSim::new(1000, 0.0, 17);
        let report = monitor.in_sample_stability(&mut sim, &[1.0]).unwrap();

        assert!(report.converged);
        assert!(report.samples >= 30);
        assert_eq!(report.required, 5 + 5 * (report.samples - 1));
        assert!(report.interval.unwrap().contains(0.0));
        assert_eq!(monitor.pending_samples(), 0);

        // trial counts 5, 10, 15, ... then the baseline is restored
        assert_eq!(&sim.history[..3], &[5, 10, 15]);
        assert!(report.sufficient);
        assert_eq!(sim.n_scenarios, 1000);
    }

    #[test]
    fn test_drift_never_stops_early() {
        // With a real mean difference the rule must not fire below the floor,
        // and with a large drift it should not fire at all.
        for seed in 0..20 {
            let mut monitor = StabilityMonitor::new(config(30, 60)).unwrap();
            let mut sim = SyntheticSim::new(10, 5.0, seed);
            let report = monitor.in_sample_stability(&mut sim, &[1.0]).unwrap();
            assert!(report.samples >= 30);
            assert!(!report.converged);
            assert_eq!(report.samples, 60);
            assert_eq!(monitor.pending_samples(), 0);
        }
    }

    #[test]
    fn test_insufficient_baseline_keeps_trial_count() {
        let mut monitor = StabilityMonitor::new(config(30, 500)).unwrap();
        let mut sim = SyntheticSim::new(5, 0.0, 3);
        let report = monitor.in_sample_stability(&mut sim, &[1.0]).unwrap();
        assert!(!report.sufficient);
        assert!(report.required > 5);
        assert_eq!(sim.n_scenarios, report.required);
    }

    struct FailingSim {
        calls: usize,
        n_scenarios: usize,
        history: Vec<usize>,
    }

    impl FailingSim {
        fn new(n_scenarios: usize) -> Self {
            Self {
                calls: 0,
                n_scenarios,
                history: Vec::new(),
            }
        }
    }

    impl ScenarioSimulation for FailingSim {
        fn simulate(&mut self, _prices: &[f64], _seed: Option<u64>) -> Result<f64> {
            self.calls += 1;
            if self.calls > 7 {
                return Err(AtoError::DimensionMismatch {
                    expected: 2,
                    actual: 1,
                });
            }
            Ok(self.calls as f64)
        }

        fn scenario_count(&self) -> usize {
            self.n_scenarios
        }

        fn set_scenario_count(&mut self, n_scenarios: usize) -> Result<()> {
            self.history.push(n_scenarios);
            self.n_scenarios = n_scenarios;
            Ok(())
        }
    }

    #[test]
    fn test_state_restored_after_error() {
        let mut monitor = StabilityMonitor::new(config(30, 500)).unwrap();
        let mut sim = FailingSim::new(100);
        assert!(monitor.in_sample_stability(&mut sim, &[1.0]).is_err());
        assert_eq!(monitor.pending_samples(), 0);
        // trials 5, 10, 15, 20 then the failure at the fourth round
        assert_eq!(sim.history, vec![5, 10, 15, 20, 100]);
        assert_eq!(sim.n_scenarios, 100);
    }

    #[test]
    fn test_allocation_model_keeps_baseline_on_bad_prices() {
        let mut monitor = StabilityMonitor::new(StabilityConfig::default()).unwrap();
        let mut ato = AtoModel::new(single_item_store(), 100).unwrap();
        let result = monitor.in_sample_stability(&mut ato, &[15.0, 16.0]);
        assert!(matches!(
            result,
            Err(AtoError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        ));
        assert_eq!(ato.n_scenarios(), 100);
        assert_eq!(monitor.pending_samples(), 0);
    }

    #[test]
    fn test_against_allocation_model() {
        let mut monitor = StabilityMonitor::new(StabilityConfig {
            min_samples: 5,
            max_rounds: 40,
            ..StabilityConfig::default()
        })
        .unwrap();
        let mut ato = AtoModel::new(single_item_store(), 100).unwrap();
        let report = monitor.in_sample_stability(&mut ato, &[15.0]).unwrap();
        assert!(report.samples >= 5 || !report.converged);
        assert_eq!(monitor.pending_samples(), 0);
        if report.sufficient {
            assert_eq!(ato.n_scenarios(), 100);
        } else {
            assert_eq!(ato.n_scenarios(), report.required);
        }
    }
}
