// src/solver/mod.rs

pub mod microlp;

use std::fmt::Debug;

use crate::model::lp::LinearModel;

pub use microlp::MicroLpSolver;

#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Set only when `status` is optimal.
    pub objective_value: Option<f64>,
    /// Indexed by `VarId`; empty unless optimal.
    pub values: Vec<f64>,
}

impl SolveOutcome {
    pub fn optimal(objective_value: f64, values: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective_value: Some(objective_value),
            values,
        }
    }

    pub fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            objective_value: None,
            values: Vec::new(),
        }
    }
}

/// External optimisation backend.
///
/// Implementations must not keep references to the model: it is mutated
/// again right after `solve` returns.
pub trait Solver: Debug + Send + Sync {
    fn solve(&self, model: &LinearModel) -> SolveOutcome;
}
