// src/surface/optimizer.rs

use std::collections::BTreeMap;

use argmin::core::{CostFunction, Error as ArgminError, Executor, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use crate::error::{AtoError, Result};
use crate::simulation::config::SurfaceConfig;
use crate::simulation::stability::StabilityMonitor;
use crate::strategy::traits::ScenarioSimulation;
use crate::surface::metamodel::{LinearRegression, MinMaxScaler, PolynomialFeatures, Regressor};

/// Recommended grid point and the surrogate's value there.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptimum {
    pub prices: Vec<i64>,
    /// Surrogate value at the continuous optimum, projected onto the ranges
    /// but not rounded.
    pub predicted: f64,
    /// In-sample R² of the metamodel.
    pub fit_score: f64,
    pub converged: bool,
}

/// Every integer point of the box spanned by `ranges`, first coordinate
/// varying slowest.
pub fn design_points(ranges: &[(i64, i64)]) -> Vec<Vec<i64>> {
    if ranges.is_empty() || ranges.iter().any(|(lo, hi)| lo > hi) {
        return Vec::new();
    }
    let mut points = Vec::new();
    let mut current: Vec<i64> = ranges.iter().map(|(lo, _)| *lo).collect();
    loop {
        points.push(current.clone());
        // odometer increment from the last coordinate
        let mut k = ranges.len();
        loop {
            if k == 0 {
                return points;
            }
            k -= 1;
            if current[k] < ranges[k].1 {
                current[k] += 1;
                break;
            }
            current[k] = ranges[k].0;
        }
    }
}

/// Fitted scale -> expand -> predict chain.
#[derive(Debug, Clone)]
struct Surrogate<R> {
    scaler: MinMaxScaler,
    poly: PolynomialFeatures,
    model: R,
}

impl<R: Regressor> Surrogate<R> {
    fn predict(&self, point: &[f64]) -> Result<f64> {
        let input = DMatrix::from_row_slice(1, point.len(), point);
        let scaled = self.scaler.transform(&input)?;
        let features = self.poly.transform(&scaled)?;
        Ok(self.model.predict(&features)?[0])
    }
}

/// Negated surrogate on a box. Points outside the box are evaluated at their
/// projection and pay a quadratic penalty, so the simplex is pulled back in.
struct NegatedSurrogate<'a, R> {
    surrogate: &'a Surrogate<R>,
    bounds: &'a [(f64, f64)],
}

impl<R: Regressor> CostFunction for NegatedSurrogate<'_, R> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let mut penalty = 0.0;
        let projected: Vec<f64> = param
            .iter()
            .zip(self.bounds)
            .map(|(v, (lo, hi))| {
                let clipped = v.clamp(*lo, *hi);
                penalty += (v - clipped).powi(2);
                clipped
            })
            .collect();
        Ok(-self.surrogate.predict(&projected)? + penalty)
    }
}

fn initial_simplex(start: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(start.len() + 1);
    vertices.push(start.to_vec());
    for (i, (lo, hi)) in bounds.iter().enumerate() {
        let width = hi - lo;
        let step = if width > 0.0 { 0.25 * width } else { 0.5 };
        let mut vertex = start.to_vec();
        vertex[i] += step;
        vertices.push(vertex);
    }
    vertices
}

/// Response-surface optimisation over a price grid.
///
/// Simulates every grid point `n_reps` times, fits a polynomial metamodel on
/// min-max scaled prices and maximises it with a bounded Nelder-Mead search.
#[derive(Debug)]
pub struct ResponseSurfaceOptimizer<R: Regressor = LinearRegression> {
    config: SurfaceConfig,
    stability: Option<StabilityMonitor>,
    responses: BTreeMap<Vec<i64>, f64>,
    surrogate: Surrogate<R>,
    fitted: bool,
    fit_score: Option<f64>,
}

impl ResponseSurfaceOptimizer<LinearRegression> {
    pub fn new(config: SurfaceConfig) -> Result<Self> {
        Self::with_model(config, LinearRegression::new())
    }
}

impl<R: Regressor> ResponseSurfaceOptimizer<R> {
    pub fn with_model(config: SurfaceConfig, model: R) -> Result<Self> {
        config.validate()?;
        info!(
            variables = config.ranges.len(),
            n_reps = config.n_reps,
            "response surface optimizer initialized"
        );
        let surrogate = Surrogate {
            scaler: MinMaxScaler::new(config.feature_range),
            poly: PolynomialFeatures::new(config.degree),
            model,
        };
        Ok(Self {
            config,
            stability: None,
            responses: BTreeMap::new(),
            surrogate,
            fitted: false,
            fit_score: None,
        })
    }

    /// Runs the stability check before the replicates of every grid point.
    pub fn with_stability_monitor(mut self, monitor: StabilityMonitor) -> Self {
        self.stability = Some(monitor);
        self
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Mean response per grid point from the last run. Points whose every
    /// replicate was undefined hold `NaN`.
    pub fn responses(&self) -> &BTreeMap<Vec<i64>, f64> {
        &self.responses
    }

    pub fn fit_score(&self) -> Option<f64> {
        self.fit_score
    }

    /// Fitted response function.
    pub fn predict(&self, point: &[f64]) -> Result<f64> {
        if !self.fitted {
            return Err(AtoError::Regression {
                reason: "the model has not been trained".to_string(),
            });
        }
        self.surrogate.predict(point)
    }

    /// Simulates the grid, fits the metamodel and maximises it.
    ///
    /// # Arguments
    /// * `sim` - The simulation evaluated `n_reps` times at every grid point.
    ///
    /// # Returns
    /// The best integer price vector inside the configured ranges, with the
    /// metamodel's predicted value and R².
    pub fn optimize<S>(&mut self, sim: &mut S) -> Result<SurfaceOptimum>
    where
        S: ScenarioSimulation + ?Sized,
    {
        self.run_simulations(sim)?;
        info!("training the metamodel");
        let score = self.fit_metamodel()?;
        info!(r2 = score, "metamodel trained");
        info!("optimizing the response function");
        self.optimize_surrogate(score)
    }

    fn run_simulations<S>(&mut self, sim: &mut S) -> Result<()>
    where
        S: ScenarioSimulation + ?Sized,
    {
        let points = design_points(&self.config.ranges);
        info!(points = points.len(), "running simulations");
        self.responses.clear();

        for point in points {
            let prices: Vec<f64> = point.iter().map(|p| *p as f64).collect();
            if let Some(monitor) = self.stability.as_mut() {
                monitor.in_sample_stability(sim, &prices)?;
            }

            let mut total = 0.0;
            let mut defined = 0usize;
            for _ in 0..self.config.n_reps {
                let value = sim.simulate(&prices, None)?;
                if value.is_finite() {
                    total += value;
                    defined += 1;
                }
            }
            let mean = if defined > 0 {
                total / defined as f64
            } else {
                warn!(?point, "no defined replicate at grid point");
                f64::NAN
            };
            debug!(?point, mean, "grid point simulated");
            self.responses.insert(point, mean);
        }
        info!("simulations completed");
        Ok(())
    }

    fn fit_metamodel(&mut self) -> Result<f64> {
        let usable: Vec<(&Vec<i64>, f64)> = self
            .responses
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k, *v))
            .collect();
        if usable.is_empty() {
            return Err(AtoError::NoValidResponses);
        }

        let dims = self.config.ranges.len();
        let x = DMatrix::from_fn(usable.len(), dims, |r, c| usable[r].0[c] as f64);
        let y = DVector::from_iterator(usable.len(), usable.iter().map(|(_, v)| *v));

        let scaled = self.surrogate.scaler.fit_transform(&x)?;
        let features = self.surrogate.poly.fit_transform(&scaled)?;
        self.surrogate.model.fit(&features, &y)?;
        let score = self.surrogate.model.score(&features, &y)?;

        self.fitted = true;
        self.fit_score = Some(score);
        Ok(score)
    }

    fn optimize_surrogate(&self, fit_score: f64) -> Result<SurfaceOptimum> {
        let bounds: Vec<(f64, f64)> = self
            .config
            .ranges
            .iter()
            .map(|(lo, hi)| (*lo as f64, *hi as f64))
            .collect();
        let start: Vec<f64> = bounds.iter().map(|(lo, hi)| (lo + hi) / 2.0).collect();

        let problem = NegatedSurrogate {
            surrogate: &self.surrogate,
            bounds: &bounds,
        };
        let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(initial_simplex(&start, &bounds))
            .with_sd_tolerance(self.config.sd_tolerance)
            .map_err(|e| AtoError::Optimizer {
                reason: e.to_string(),
            })?;
        let max_iters = self.config.max_iters;
        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(max_iters))
            .run()
            .map_err(|e| AtoError::Optimizer {
                reason: e.to_string(),
            })?;

        let converged = matches!(
            res.state.termination_status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        );
        if !converged {
            warn!(
                status = ?res.state.termination_status,
                "optimization did not converge, returning the best point found"
            );
        }

        let best: Vec<f64> = res
            .state
            .best_param
            .clone()
            .unwrap_or(start)
            .iter()
            .zip(&bounds)
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect();
        let predicted = self.surrogate.predict(&best)?;
        let prices = best
            .iter()
            .zip(&self.config.ranges)
            .map(|(v, (lo, hi))| (v.round() as i64).clamp(*lo, *hi))
            .collect();

        Ok(SurfaceOptimum {
            prices,
            predicted,
            fit_score,
            converged,
        })
    }
}
