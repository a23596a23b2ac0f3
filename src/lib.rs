// src/lib.rs

//! Price optimisation for assemble-to-order stores.
//!
//! A two-stage stochastic allocation model ([`simulation::engine::AtoModel`])
//! turns candidate prices into an expected profit, and a response-surface
//! optimiser ([`surface::optimizer::ResponseSurfaceOptimizer`]) searches an
//! integer price grid through a polynomial metamodel of that profit.

pub mod error;
pub mod io;
pub mod model;
pub mod simulation;
pub mod solver;
pub mod strategy;
pub mod surface;

pub use error::{AtoError, Result};
