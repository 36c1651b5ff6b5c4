//! The interface between a [`MathModel`](super::MathModel) and a solver.
use super::equation::Equation;
use super::solver::NativeOptions;
use super::variable::{Variable, VariableId};
use anyhow::Result;
use std::fmt::Debug;

/// A solver backend.
///
/// A backend is created fresh for every solve. The model registers all of its variables first,
/// then its equalities and inequalities and finally the objective, each under a name unique within
/// the model.
pub trait Backend: Debug {
    /// Register a variable
    fn register_variable(&mut self, name: &str, variable: &Variable) -> Result<()>;

    /// Register an equality or inequality
    fn register_equation(&mut self, name: &str, equation: &Equation) -> Result<()>;

    /// Register the objective to be minimised
    fn register_objective(&mut self, name: &str, objective: &Equation) -> Result<()>;

    /// Solve the registered problem with the given native solver options.
    ///
    /// Anything other than an optimal solution is an error carrying the solver's status.
    fn solve(&mut self, options: &NativeOptions) -> Result<()>;

    /// Get the solved values of a variable
    fn extract_result(&self, variable: VariableId) -> Result<Vec<f64>>;

    /// Get the value of the objective of the solution
    fn objective_value(&self) -> Result<f64>;
}
