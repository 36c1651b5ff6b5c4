//! Linear terms of an equation.
use super::variable::{Variable, VariableId};
use crate::numeric::{Numeric, Shape};
use anyhow::{Context, Result, bail, ensure};
use std::borrow::Cow;
use std::cell::OnceCell;

/// A single coefficient times one entry of a variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    /// The variable
    pub variable: VariableId,
    /// Index into the variable
    pub index: usize,
    /// The coefficient
    pub coefficient: f64,
}

/// How a summand contributes to the rows of its equation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummandKind {
    /// One term per row of the equation
    PerRow,
    /// The sum over all indices, contributing the same terms to every row
    Sum,
}

/// A variable times a factor over a subset of the variable's indices
#[derive(Debug, Clone)]
pub struct Summand {
    variable: VariableId,
    variable_label: String,
    indices: Vec<usize>,
    factor: Numeric,
    shape: Shape,
    kind: SummandKind,
    sum_terms: OnceCell<Vec<Term>>,
}

impl Summand {
    /// Create a new summand.
    ///
    /// # Arguments
    ///
    /// * `variable` - The variable
    /// * `factor` - A scalar or one factor per index
    /// * `indices` - Indices of the variable to use; all indices if `None`
    /// * `kind` - Whether the summand is evaluated per row or summed up
    pub fn new(
        variable: &Variable,
        factor: Numeric,
        indices: Option<Vec<usize>>,
        kind: SummandKind,
    ) -> Result<Self> {
        let indices = indices.unwrap_or_else(|| (0..variable.len()).collect());
        ensure!(
            !indices.is_empty(),
            "Summand of variable {} must use at least one index",
            variable.label()
        );
        if let Some(index) = indices.iter().find(|&&i| i >= variable.len()) {
            bail!(
                "Index {index} is out of range for variable {} of length {}",
                variable.label(),
                variable.len()
            );
        }

        let shape = Shape::of_len(indices.len())
            .broadcast(factor.shape())
            .with_context(|| {
                format!(
                    "Factor of length {} does not match the {} indices of variable {}",
                    factor.len(),
                    indices.len(),
                    variable.label()
                )
            })?;

        Ok(Self {
            variable: variable.id(),
            variable_label: variable.label().to_string(),
            indices,
            factor,
            shape,
            kind,
            sum_terms: OnceCell::new(),
        })
    }

    /// The variable this summand refers to
    pub fn variable(&self) -> VariableId {
        self.variable
    }

    /// Label of the variable this summand refers to
    pub fn variable_label(&self) -> &str {
        &self.variable_label
    }

    /// How the summand contributes to its equation
    pub fn kind(&self) -> SummandKind {
        self.kind
    }

    /// The number of rows this summand spans; a sum always spans a single row
    pub fn shape(&self) -> Shape {
        match self.kind {
            SummandKind::PerRow => self.shape,
            SummandKind::Sum => Shape::Scalar,
        }
    }

    /// See [`Summand::shape`]
    pub fn len(&self) -> usize {
        self.shape().len()
    }

    /// Whether the summand spans no rows (never true for a constructed summand)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The term for position `position` of the summand's own shape
    fn term_at(&self, position: usize) -> Term {
        let position = if self.shape == Shape::Scalar {
            0
        } else {
            position
        };
        let index = if self.indices.len() == 1 {
            self.indices[0]
        } else {
            self.indices[position]
        };

        Term {
            variable: self.variable,
            index,
            coefficient: self.factor.get(position),
        }
    }

    /// The terms this summand contributes to row `at_index` of its equation.
    ///
    /// A summand of length one contributes the same term to every row; a sum ignores `at_index`
    /// and contributes all of its terms, computed once and then cached.
    pub fn math_expression(&self, at_index: usize) -> Cow<'_, [Term]> {
        match self.kind {
            SummandKind::PerRow => Cow::Owned(vec![self.term_at(at_index)]),
            SummandKind::Sum => Cow::Borrowed(
                self.sum_terms
                    .get_or_init(|| (0..self.shape.len()).map(|i| self.term_at(i)).collect()),
            ),
        }
    }

    /// Human-readable form of the summand in row `row`
    pub fn description(&self, row: usize) -> String {
        let position = if self.shape() == Shape::Scalar { 0 } else { row };
        let term = self.term_at(position);
        let single = format!(
            "{} * {}[{}]",
            term.coefficient, self.variable_label, term.index
        );
        match self.kind {
            SummandKind::PerRow => single,
            SummandKind::Sum if self.shape.len() > 1 => format!("∑({single}+..)"),
            SummandKind::Sum => format!("∑({single})"),
        }
    }
}
