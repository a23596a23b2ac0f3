// src/solver/microlp.rs

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel,
};
use tracing::debug;

use super::{SolveOutcome, SolveStatus, Solver};
use crate::model::lp::{LinearExpr, LinearModel, Sense, VarKind};

/// Pure-Rust branch-and-bound MILP backend (good_lp + microlp).
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpSolver;

impl MicroLpSolver {
    pub fn new() -> Self {
        Self
    }
}

fn to_expression(expr: &LinearExpr, vars: &[good_lp::Variable]) -> Expression {
    expr.terms()
        .iter()
        .map(|(id, coef)| *coef * vars[id.index()])
        .sum()
}

impl Solver for MicroLpSolver {
    fn solve(&self, model: &LinearModel) -> SolveOutcome {
        let Some(objective) = model.objective() else {
            return SolveOutcome::failed(SolveStatus::Other("no objective set".to_string()));
        };

        let mut problem = ProblemVariables::new();
        let vars: Vec<good_lp::Variable> = model
            .variables()
            .iter()
            .map(|def| {
                let definition = variable().min(def.lower);
                match def.kind {
                    VarKind::Integer => problem.add(definition.integer()),
                    VarKind::Continuous => problem.add(definition),
                }
            })
            .collect();

        let goal = to_expression(&objective.expr, &vars);
        let unsolved = match objective.sense {
            Sense::Maximize => problem.maximise(goal),
            Sense::Minimize => problem.minimise(goal),
        };
        let mut solver_model = unsolved.using(microlp);
        for row in model.constraints() {
            let lhs = to_expression(&row.lhs, &vars);
            // constants move to the right-hand side
            let rhs = row.rhs - row.lhs.constant();
            solver_model.add_constraint(constraint!(lhs <= rhs));
        }

        debug!(
            model = model.name(),
            variables = vars.len(),
            constraints = model.constraint_count(),
            "solving"
        );

        match solver_model.solve() {
            Ok(solution) => {
                let values: Vec<f64> = vars.iter().map(|v| solution.value(*v)).collect();
                let value = objective.expr.eval(&values);
                SolveOutcome::optimal(value, values)
            }
            Err(ResolutionError::Infeasible) => SolveOutcome::failed(SolveStatus::Infeasible),
            Err(ResolutionError::Unbounded) => SolveOutcome::failed(SolveStatus::Unbounded),
            Err(other) => SolveOutcome::failed(SolveStatus::Other(other.to_string())),
        }
    }
}
