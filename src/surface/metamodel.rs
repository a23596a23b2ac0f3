// src/surface/metamodel.rs

//! Building blocks of the response-surface metamodel: min-max scaling,
//! polynomial feature expansion and a least-squares regressor.

use std::fmt::Debug;

use nalgebra::{DMatrix, DVector};

use crate::error::{AtoError, Result};

/// Fit/predict/score contract of the metamodel regressor.
pub trait Regressor: Debug {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<()>;

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>>;

    /// Coefficient of determination (R²) on `(x, y)`.
    fn score(&self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<f64> {
        let predicted = self.predict(x)?;
        Ok(r2_score(y, &predicted))
    }
}

pub fn r2_score(y: &DVector<f64>, predicted: &DVector<f64>) -> f64 {
    let y_mean = y.mean();
    let ss_res: f64 = y
        .iter()
        .zip(predicted.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum();
    let ss_tot: f64 = y.iter().map(|a| (a - y_mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Ordinary least squares with an intercept, solved through an SVD so
/// rank-deficient designs get the minimum-norm coefficients.
#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    coefficients: Option<DVector<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> Option<&DVector<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(AtoError::Regression {
                reason: format!("{} rows of features but {} targets", x.nrows(), y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(AtoError::Regression {
                reason: "empty training set".to_string(),
            });
        }

        let means = DVector::from_iterator(x.ncols(), x.column_iter().map(|c| c.mean()));
        let y_mean = y.mean();
        let mut centred = x.clone();
        for (j, mut col) in centred.column_iter_mut().enumerate() {
            col.add_scalar_mut(-means[j]);
        }
        let target = y.add_scalar(-y_mean);

        let coefficients = centred
            .svd(true, true)
            .solve(&target, 1e-10)
            .map_err(|reason| AtoError::Regression {
                reason: reason.to_string(),
            })?;

        self.intercept = y_mean - means.dot(&coefficients);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or_else(|| AtoError::Regression {
            reason: "the model has not been trained".to_string(),
        })?;
        if x.ncols() != coefficients.len() {
            return Err(AtoError::Regression {
                reason: format!(
                    "expected {} features, got {}",
                    coefficients.len(),
                    x.ncols()
                ),
            });
        }
        Ok((x * coefficients).add_scalar(self.intercept))
    }
}

/// Per-column affine map of the training range onto `feature_range`.
/// Constant columns are only shifted.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    feature_range: (f64, f64),
    data_min: Vec<f64>,
    scale: Vec<f64>,
}

impl MinMaxScaler {
    pub fn new(feature_range: (f64, f64)) -> Self {
        Self {
            feature_range,
            data_min: Vec::new(),
            scale: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.scale.is_empty()
    }

    pub fn fit(&mut self, x: &DMatrix<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(AtoError::Regression {
                reason: "cannot fit a scaler on no rows".to_string(),
            });
        }
        let (lo, hi) = self.feature_range;
        self.data_min = x.column_iter().map(|c| c.min()).collect();
        self.scale = x
            .column_iter()
            .map(|c| {
                let range = c.max() - c.min();
                let range = if range == 0.0 { 1.0 } else { range };
                (hi - lo) / range
            })
            .collect();
        Ok(())
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_width(x.ncols())?;
        let lo = self.feature_range.0;
        Ok(DMatrix::from_fn(x.nrows(), x.ncols(), |r, c| {
            (x[(r, c)] - self.data_min[c]) * self.scale[c] + lo
        }))
    }

    pub fn inverse_transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_width(x.ncols())?;
        let lo = self.feature_range.0;
        Ok(DMatrix::from_fn(x.nrows(), x.ncols(), |r, c| {
            (x[(r, c)] - lo) / self.scale[c] + self.data_min[c]
        }))
    }

    pub fn fit_transform(&mut self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    fn check_width(&self, ncols: usize) -> Result<()> {
        if !self.is_fitted() {
            return Err(AtoError::Regression {
                reason: "scaler has not been fitted".to_string(),
            });
        }
        if ncols != self.scale.len() {
            return Err(AtoError::Regression {
                reason: format!("scaler fitted on {} columns, got {ncols}", self.scale.len()),
            });
        }
        Ok(())
    }
}

/// All monomials of total degree `0..=degree`, bias column first, then by
/// degree with combinations in lexicographic order.
#[derive(Debug, Clone)]
pub struct PolynomialFeatures {
    degree: u32,
    powers: Vec<Vec<u32>>,
    n_features: usize,
}

impl PolynomialFeatures {
    pub fn new(degree: u32) -> Self {
        Self {
            degree,
            powers: Vec::new(),
            n_features: 0,
        }
    }

    pub fn fit(&mut self, n_features: usize) {
        let mut powers = Vec::new();
        for d in 0..=self.degree {
            let mut combo = Vec::with_capacity(d as usize);
            push_combinations(n_features, d as usize, 0, &mut combo, &mut powers);
        }
        self.powers = powers;
        self.n_features = n_features;
    }

    /// Exponent vectors, one per output column.
    pub fn powers(&self) -> &[Vec<u32>] {
        &self.powers
    }

    pub fn n_output_features(&self) -> usize {
        self.powers.len()
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if self.powers.is_empty() || x.ncols() != self.n_features {
            return Err(AtoError::Regression {
                reason: format!(
                    "polynomial expansion fitted for {} features, got {}",
                    self.n_features,
                    x.ncols()
                ),
            });
        }
        Ok(DMatrix::from_fn(x.nrows(), self.powers.len(), |r, k| {
            self.powers[k]
                .iter()
                .enumerate()
                .map(|(j, e)| x[(r, j)].powi(*e as i32))
                .product()
        }))
    }

    pub fn fit_transform(&mut self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.fit(x.ncols());
        self.transform(x)
    }
}

/// Appends exponent vectors for every multiset of `remaining` indices drawn
/// from `start..n_features`.
fn push_combinations(
    n_features: usize,
    remaining: usize,
    start: usize,
    combo: &mut Vec<usize>,
    out: &mut Vec<Vec<u32>>,
) {
    if remaining == 0 {
        let mut powers = vec![0u32; n_features];
        for &j in combo.iter() {
            powers[j] += 1;
        }
        out.push(powers);
        return;
    }
    for j in start..n_features {
        combo.push(j);
        push_combinations(n_features, remaining - 1, j, combo, out);
        combo.pop();
    }
}
