//! Equations, inequalities and the objective.
//!
//! An [`Equation`] represents either a single row or a whole family of per-time-step rows sharing
//! one symbolic definition. The number of rows is fixed by the first contribution with more than
//! one entry; every later contribution must have one entry or exactly that many.
use super::summand::{Summand, SummandKind, Term};
use super::variable::Variable;
use crate::numeric::Numeric;
use anyhow::{Result, bail};
use itertools::Itertools;
use std::fmt;

/// Identifies an equation within the model which created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("e{_0}")]
pub struct EquationId(pub(crate) usize);

/// The type of an equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquationKind {
    /// Every row asserts `lhs == rhs`
    Equality,
    /// Every row asserts `lhs <= rhs`
    Inequality,
    /// The single row is minimised
    Objective,
}

impl fmt::Display for EquationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equality => "equality",
            Self::Inequality => "inequality",
            Self::Objective => "objective",
        };
        write!(f, "{name}")
    }
}

/// A linear equation: the sum of its summands on the left, an accumulated constant on the right
#[derive(Debug, Clone)]
pub struct Equation {
    id: EquationId,
    label: String,
    kind: EquationKind,
    summands: Vec<Summand>,
    constant: Numeric,
    parts_of_constant: Vec<Numeric>,
    nr_of_single_equations: usize,
}

impl Equation {
    pub(crate) fn new(id: EquationId, label: String, kind: EquationKind) -> Self {
        log::debug!("Equation created: {label}");

        Self {
            id,
            label,
            kind,
            summands: Vec::new(),
            constant: Numeric::Scalar(0.0),
            parts_of_constant: Vec::new(),
            nr_of_single_equations: 1,
        }
    }

    /// Identifier within the owning model
    pub fn id(&self) -> EquationId {
        self.id
    }

    /// Label, unique within the model
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The type of equation
    pub fn kind(&self) -> EquationKind {
        self.kind
    }

    /// Number of rows represented by this equation
    pub fn nr_of_single_equations(&self) -> usize {
        self.nr_of_single_equations
    }

    /// The summands in the order they were added
    pub fn summands(&self) -> &[Summand] {
        &self.summands
    }

    /// The accumulated right-hand side
    pub fn constant(&self) -> &Numeric {
        &self.constant
    }

    /// Each contribution to the right-hand side, in the order it was added
    pub fn parts_of_constant(&self) -> &[Numeric] {
        &self.parts_of_constant
    }

    /// The right-hand side of row `row`
    pub fn constant_at(&self, row: usize) -> f64 {
        self.constant.get(row)
    }

    /// Add a summand to the left-hand side.
    ///
    /// # Arguments
    ///
    /// * `variable` - The variable
    /// * `factor` - A scalar or one factor per index
    /// * `indices` - Indices of the variable to use; all indices if `None`
    /// * `as_sum` - Whether to add the sum over all indices (a single row) instead of one term
    ///   per row
    pub fn add_summand(
        &mut self,
        variable: &Variable,
        factor: impl Into<Numeric>,
        indices: Option<Vec<usize>>,
        as_sum: bool,
    ) -> Result<()> {
        let kind = if as_sum {
            SummandKind::Sum
        } else {
            SummandKind::PerRow
        };
        let summand = Summand::new(variable, factor.into(), indices, kind)?;
        self.update_nr_of_single_equations(summand.len(), variable.label())?;
        self.summands.push(summand);

        Ok(())
    }

    /// Add to the right-hand side.
    ///
    /// Contributions accumulate; each one is also kept individually.
    pub fn add_constant(&mut self, value: impl Into<Numeric>) -> Result<()> {
        let value = value.into();
        self.update_nr_of_single_equations(value.len(), "constant")?;
        self.constant = self.constant.try_add(&value)?;
        self.parts_of_constant.push(value);

        Ok(())
    }

    /// Check a new contribution against the established number of rows
    fn update_nr_of_single_equations(&mut self, length: usize, contribution: &str) -> Result<()> {
        if length == 1 || length == self.nr_of_single_equations {
            return Ok(());
        }

        if self.nr_of_single_equations == 1 {
            if self.kind == EquationKind::Objective {
                bail!(
                    "Objective {} must consist of a single row, but {contribution} has length \
                     {length}",
                    self.label
                );
            }
            self.nr_of_single_equations = length;
            return Ok(());
        }

        bail!(
            "{contribution} has length {length}, which does not match the {} rows of equation {}",
            self.nr_of_single_equations,
            self.label
        )
    }

    /// The terms and right-hand side of every row
    pub fn rows(&self) -> impl Iterator<Item = (Vec<Term>, f64)> + '_ {
        (0..self.nr_of_single_equations).map(|row| {
            let terms = self
                .summands
                .iter()
                .flat_map(|summand| summand.math_expression(row).into_owned())
                .collect();
            (terms, self.constant_at(row))
        })
    }

    /// Human-readable form of row `row` (clamped to the last row)
    pub fn description(&self, row: usize) -> String {
        let row = row.min(self.nr_of_single_equations - 1);
        let (name, index) = match self.kind {
            EquationKind::Objective => ("OBJ".to_string(), String::new()),
            _ => (
                format!("EQ {}", self.label),
                format!("[{}/{}]", row + 1, self.nr_of_single_equations),
            ),
        };
        let sign = match self.kind {
            EquationKind::Inequality => ">=",
            EquationKind::Equality | EquationKind::Objective => "= ",
        };
        let summands = self
            .summands
            .iter()
            .map(|summand| summand.description(row))
            .join(" + ");
        let header = format!("{name} {index}");

        format!(
            "{header:<30}: {:>8} {sign} {summands}",
            self.constant_at(row)
        )
    }
}
