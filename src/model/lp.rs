// src/model/lp.rs

//! Solver-agnostic description of a mixed-integer linear program.
//!
//! Constraints live in named blocks so a caller can retract exactly the rows
//! it added. [`ScopedConstraints`] ties a block's lifetime to a scope.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Integer,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
}

/// `sum(coef * var) + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Evaluates the expression against a full assignment indexed by `VarId`.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

/// `lhs <= rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub lhs: LinearExpr,
    pub rhs: f64,
}

impl Constraint {
    pub fn leq(name: impl Into<String>, lhs: LinearExpr, rhs: f64) -> Self {
        Self {
            name: name.into(),
            lhs,
            rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub expr: LinearExpr,
    pub sense: Sense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u64);

#[derive(Debug, Clone, PartialEq)]
struct ConstraintBlock {
    id: BlockId,
    name: String,
    rows: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    name: String,
    variables: Vec<Variable>,
    blocks: Vec<ConstraintBlock>,
    objective: Option<Objective>,
    next_block: u64,
}

impl LinearModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            blocks: Vec::new(),
            objective: None,
            next_block: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_variable(&mut self, name: impl Into<String>, kind: VarKind, lower: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            name: name.into(),
            kind,
            lower,
        });
        id
    }

    /// Adds `count` variables named `name[k]`.
    pub fn add_variables(&mut self, name: &str, count: usize, kind: VarKind, lower: f64) -> Vec<VarId> {
        (0..count)
            .map(|k| self.add_variable(format!("{name}[{k}]"), kind, lower))
            .collect()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn add_constraints<I>(&mut self, name: impl Into<String>, rows: I) -> BlockId
    where
        I: IntoIterator<Item = Constraint>,
    {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(ConstraintBlock {
            id,
            name: name.into(),
            rows: rows.into_iter().collect(),
        });
        id
    }

    /// Returns false when the block was already gone.
    pub fn remove_constraints(&mut self, block: BlockId) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.id != block);
        self.blocks.len() != before
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.blocks.iter().flat_map(|b| b.rows.iter())
    }

    pub fn constraint_count(&self) -> usize {
        self.blocks.iter().map(|b| b.rows.len()).sum()
    }

    pub fn block_names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn set_objective(&mut self, expr: LinearExpr, sense: Sense) {
        self.objective = Some(Objective { expr, sense });
    }

    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }
}

/// A constraint block that is removed from its model when dropped,
/// whichever way the scope is left.
pub struct ScopedConstraints<'m> {
    model: &'m mut LinearModel,
    block: BlockId,
}

impl<'m> ScopedConstraints<'m> {
    pub fn attach<I>(model: &'m mut LinearModel, name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Constraint>,
    {
        let block = model.add_constraints(name, rows);
        Self { model, block }
    }

    pub fn model(&self) -> &LinearModel {
        self.model
    }
}

impl Drop for ScopedConstraints<'_> {
    fn drop(&mut self) {
        self.model.remove_constraints(self.block);
    }
}
