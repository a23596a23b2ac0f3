// src/model/store.rs

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{AtoError, Result};

fn default_max_demand() -> f64 {
    10.0
}

fn default_demand_scaling() -> f64 {
    0.45
}

/// Raw store parameters as they arrive from a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreParams {
    pub items: Vec<String>,
    pub products: Vec<String>,
    pub machines: Vec<String>,
    pub costs: Vec<f64>,
    pub machine_capacities: Vec<f64>,
    /// One row per machine, one column per item.
    pub process_times: Vec<Vec<f64>>,
    /// One row per product, one column per item (bill of materials).
    pub connection_matrix: Vec<Vec<f64>>,
    #[serde(default = "default_max_demand")]
    pub max_demand: f64,
    #[serde(default = "default_demand_scaling")]
    pub demand_scaling: f64,
}

/// Identifying metadata, only used for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreProfile {
    pub kind: String,
    pub name: String,
    pub focus: String,
    pub location: String,
}

impl Default for StoreProfile {
    fn default() -> Self {
        Self {
            kind: "fashion store".to_string(),
            name: String::new(),
            focus: String::new(),
            location: String::new(),
        }
    }
}

/// Snapshot returned by [`StoreModel::features`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreFeatures {
    pub kind: String,
    pub name: String,
    pub focus: String,
    pub location: String,
    pub items: Vec<String>,
    pub products: Vec<String>,
}

/// Static production data of an assemble-to-order store.
///
/// Every derived quantity (counts, `demand_parameters`) is computed together
/// with the arrays it depends on, so a rejected update leaves the previous
/// state untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreModel {
    profile: StoreProfile,
    items: Vec<String>,
    products: Vec<String>,
    machines: Vec<String>,
    costs: DVector<f64>,
    machine_capacities: DVector<f64>,
    process_times: DMatrix<f64>,
    connection: DMatrix<f64>,
    max_demand: f64,
    demand_scaling: f64,
    demand_parameters: DVector<f64>,
}

impl StoreModel {
    pub fn new(params: StoreParams, profile: StoreProfile) -> Result<Self> {
        let mut store = Self::validated(params)?;
        store.profile = profile;
        Ok(store)
    }

    /// Replaces every parameter at once. On error the store is unchanged.
    pub fn set_params(&mut self, params: StoreParams) -> Result<()> {
        let mut next = Self::validated(params)?;
        next.profile = std::mem::take(&mut self.profile);
        *self = next;
        Ok(())
    }

    pub fn features(&self) -> StoreFeatures {
        StoreFeatures {
            kind: self.profile.kind.clone(),
            name: self.profile.name.clone(),
            focus: self.profile.focus.clone(),
            location: self.profile.location.clone(),
            items: self.items.clone(),
            products: self.products.clone(),
        }
    }

    fn validated(params: StoreParams) -> Result<Self> {
        let n_items = params.items.len();
        let n_products = params.products.len();
        let n_machines = params.machines.len();

        if n_items == 0 {
            return Err(AtoError::config("store must declare at least one item"));
        }
        if n_products == 0 {
            return Err(AtoError::config("store must declare at least one product"));
        }

        check_len("costs", params.costs.len(), n_items)?;
        check_len(
            "machine_capacities",
            params.machine_capacities.len(),
            n_machines,
        )?;
        check_non_negative("costs", &params.costs)?;
        check_non_negative("machine_capacities", &params.machine_capacities)?;

        let process_times = matrix_from_rows("process_times", &params.process_times, n_machines, n_items)?;
        let connection = matrix_from_rows("connection_matrix", &params.connection_matrix, n_products, n_items)?;

        if !params.max_demand.is_finite() {
            return Err(AtoError::config("max_demand must be finite"));
        }
        if !params.demand_scaling.is_finite() || params.demand_scaling < 0.0 {
            return Err(AtoError::config(format!(
                "demand_scaling must be a finite non-negative number, got {}",
                params.demand_scaling
            )));
        }

        let costs = DVector::from_vec(params.costs);
        // max_demand + scaling * (connection . cost), one entry per product
        let demand_parameters =
            (&connection * &costs).map(|v| params.max_demand + params.demand_scaling * v);

        Ok(Self {
            profile: StoreProfile::default(),
            items: params.items,
            products: params.products,
            machines: params.machines,
            costs,
            machine_capacities: DVector::from_vec(params.machine_capacities),
            process_times,
            connection,
            max_demand: params.max_demand,
            demand_scaling: params.demand_scaling,
            demand_parameters,
        })
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    pub fn n_products(&self) -> usize {
        self.products.len()
    }

    pub fn n_machines(&self) -> usize {
        self.machines.len()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn machines(&self) -> &[String] {
        &self.machines
    }

    pub fn costs(&self) -> &DVector<f64> {
        &self.costs
    }

    pub fn machine_capacities(&self) -> &DVector<f64> {
        &self.machine_capacities
    }

    /// Shape (n_machines, n_items).
    pub fn process_times(&self) -> &DMatrix<f64> {
        &self.process_times
    }

    /// Shape (n_products, n_items).
    pub fn connection(&self) -> &DMatrix<f64> {
        &self.connection
    }

    pub fn max_demand(&self) -> f64 {
        self.max_demand
    }

    pub fn demand_scaling(&self) -> f64 {
        self.demand_scaling
    }

    pub fn demand_parameters(&self) -> &DVector<f64> {
        &self.demand_parameters
    }
}

fn check_len(field: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(AtoError::config(format!(
            "{field} has {actual} entries, expected {expected}"
        )));
    }
    Ok(())
}

fn check_non_negative(field: &str, values: &[f64]) -> Result<()> {
    if let Some((idx, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(AtoError::config(format!(
            "{field}[{idx}] must be finite and non-negative, got {v}"
        )));
    }
    Ok(())
}

fn matrix_from_rows(
    field: &str,
    rows: &[Vec<f64>],
    n_rows: usize,
    n_cols: usize,
) -> Result<DMatrix<f64>> {
    check_len(field, rows.len(), n_rows)?;
    for (r, row) in rows.iter().enumerate() {
        if row.len() != n_cols {
            return Err(AtoError::config(format!(
                "{field} row {r} has {} columns, expected {n_cols}",
                row.len()
            )));
        }
        check_non_negative(&format!("{field}[{r}]"), row)?;
    }
    Ok(DMatrix::from_fn(n_rows, n_cols, |r, c| rows[r][c]))
}
