//! Solver backend using the HiGHS solver.
use super::backend::Backend;
use super::equation::{Equation, EquationKind};
use super::solver::{NativeOptions, OptionValue};
use super::variable::{Variable, VariableId};
use anyhow::{Context, Result, anyhow, ensure};
use highs::{HighsModelStatus, RowProblem as Problem, Sense};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// A column of the problem, staged until the problem is solved
#[derive(Debug, Clone, PartialEq)]
struct ColumnSpec {
    lower: f64,
    upper: f64,
    integer: bool,
    cost: f64,
}

/// A row of the problem, staged until the problem is solved
#[derive(Debug, Clone, PartialEq)]
struct RowSpec {
    lower: f64,
    upper: f64,
    factors: Vec<(usize, f64)>,
}

/// A [`Backend`] which solves the problem with HiGHS.
///
/// Columns and rows are collected as they are registered, because the costs of the columns are
/// only known once the objective has been registered.
#[derive(Debug, Default)]
pub struct HighsBackend {
    columns: Vec<ColumnSpec>,
    /// The first column of each variable and its length
    variables: HashMap<VariableId, (usize, usize)>,
    rows: Vec<RowSpec>,
    names: HashSet<String>,
    objective_registered: bool,
    solution: Option<Vec<f64>>,
}

impl HighsBackend {
    fn register_name(&mut self, name: &str) -> Result<()> {
        ensure!(
            self.names.insert(name.to_string()),
            "Name {name} is already registered with the solver"
        );

        Ok(())
    }

    /// The column of entry `index` of a variable
    fn column(&self, variable: VariableId, index: usize) -> Result<usize> {
        let &(first, len) = self
            .variables
            .get(&variable)
            .with_context(|| format!("Variable {variable} is not registered with the solver"))?;
        ensure!(
            index < len,
            "Index {index} is out of range for variable {variable} of length {len}"
        );

        Ok(first + index)
    }
}

/// Apply a native option to a HiGHS model
fn apply_option(model: &mut highs::Model, name: &str, value: &OptionValue) -> Result<()> {
    match value {
        OptionValue::Bool(value) => model.set_option(name, *value),
        OptionValue::Int(value) => {
            let value = i32::try_from(*value)
                .with_context(|| format!("Value {value} of option {name} is out of range"))?;
            model.set_option(name, value);
        }
        OptionValue::Float(value) => model.set_option(name, *value),
        OptionValue::Text(value) => model.set_option(name, value.as_str()),
    }

    Ok(())
}

impl Backend for HighsBackend {
    fn register_variable(&mut self, name: &str, variable: &Variable) -> Result<()> {
        self.register_name(name)?;
        let first = self.columns.len();
        for index in 0..variable.len() {
            let (lower, upper) = variable.bounds_at(index);
            self.columns.push(ColumnSpec {
                lower: lower.unwrap_or(f64::NEG_INFINITY),
                upper: upper.unwrap_or(f64::INFINITY),
                integer: variable.is_binary(),
                cost: 0.0,
            });
        }
        self.variables.insert(variable.id(), (first, variable.len()));

        Ok(())
    }

    fn register_equation(&mut self, name: &str, equation: &Equation) -> Result<()> {
        self.register_name(name)?;
        for (terms, rhs) in equation.rows() {
            // Merge repeated columns and drop zero coefficients
            let mut factors = IndexMap::new();
            for term in terms {
                *factors
                    .entry(self.column(term.variable, term.index)?)
                    .or_insert(0.0) += term.coefficient;
            }
            let factors = factors.into_iter().filter(|&(_, f)| f != 0.0).collect();

            let lower = match equation.kind() {
                EquationKind::Equality => rhs,
                EquationKind::Inequality => f64::NEG_INFINITY,
                EquationKind::Objective => {
                    return Err(anyhow!("Objective {name} cannot be added as a constraint"));
                }
            };
            self.rows.push(RowSpec {
                lower,
                upper: rhs,
                factors,
            });
        }

        Ok(())
    }

    fn register_objective(&mut self, name: &str, objective: &Equation) -> Result<()> {
        ensure!(
            !self.objective_registered,
            "An objective is already registered with the solver"
        );
        self.register_name(name)?;
        for (terms, _) in objective.rows() {
            for term in terms {
                let column = self.column(term.variable, term.index)?;
                self.columns[column].cost += term.coefficient;
            }
        }
        self.objective_registered = true;

        Ok(())
    }

    fn solve(&mut self, options: &NativeOptions) -> Result<()> {
        self.solution = None;

        let mut problem = Problem::default();
        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|column| {
                if column.integer {
                    problem.add_integer_column(column.cost, column.lower..=column.upper)
                } else {
                    problem.add_column(column.cost, column.lower..=column.upper)
                }
            })
            .collect();
        for row in &self.rows {
            problem.add_row(
                row.lower..=row.upper,
                row.factors.iter().map(|&(column, factor)| (columns[column], factor)),
            );
        }

        let mut model = problem.optimise(Sense::Minimise);
        for (name, value) in options {
            apply_option(&mut model, name, value)?;
        }

        let solved = model.solve();
        match solved.status() {
            HighsModelStatus::Optimal => {
                self.solution = Some(solved.get_solution().columns().to_vec());
                Ok(())
            }
            status => Err(anyhow!("Could not solve: {status:?}")),
        }
    }

    fn extract_result(&self, variable: VariableId) -> Result<Vec<f64>> {
        let solution = self
            .solution
            .as_ref()
            .context("The problem has not been solved")?;
        let &(first, len) = self
            .variables
            .get(&variable)
            .with_context(|| format!("Variable {variable} is not registered with the solver"))?;

        Ok(solution[first..first + len].to_vec())
    }

    fn objective_value(&self) -> Result<f64> {
        let solution = self
            .solution
            .as_ref()
            .context("The problem has not been solved")?;

        Ok(self
            .columns
            .iter()
            .zip(solution)
            .map(|(column, value)| column.cost * value)
            .sum())
    }
}
