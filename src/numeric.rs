//! Values which are either a single number or one number per index.
//!
//! Most model inputs (bounds, factors, constants) may be given either as a scalar, which applies
//! to every index, or as a vector with one entry per index. The [`Shape`] of a value decides how it
//! combines with others.
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The shape of a value taking part in an equation.
///
/// Anything of length one is treated as a scalar and broadcasts against any vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single value
    Scalar,
    /// A vector with the given number of entries (never one)
    Vector(usize),
}

impl Shape {
    /// The shape of something with `len` entries
    pub fn of_len(len: usize) -> Self {
        if len == 1 {
            Self::Scalar
        } else {
            Self::Vector(len)
        }
    }

    /// The number of entries
    pub fn len(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector(len) => len,
        }
    }

    /// Whether this shape has no entries at all
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Combine two shapes.
    ///
    /// A scalar broadcasts against anything; two vectors are only compatible if they have the same
    /// length.
    ///
    /// # Returns
    ///
    /// The resulting shape or `None` if the shapes cannot be combined.
    pub fn broadcast(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Self::Scalar, shape) | (shape, Self::Scalar) => Some(shape),
            (Self::Vector(a), Self::Vector(b)) if a == b => Some(self),
            _ => None,
        }
    }
}

/// A scalar or a vector of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    /// A single value, applying to every index
    Scalar(f64),
    /// One value per index
    Vector(Vec<f64>),
}

impl Numeric {
    /// Number of entries (one for a scalar)
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(values) => values.len(),
        }
    }

    /// Whether this is an empty vector
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The broadcasting shape of this value
    pub fn shape(&self) -> Shape {
        Shape::of_len(self.len())
    }

    /// Whether the value is a [`Numeric::Scalar`]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Get the value at `index`, broadcasting values of length one.
    ///
    /// # Panics
    ///
    /// Panics if this is a vector with more than one entry and `index` is out of range.
    pub fn get(&self, index: usize) -> f64 {
        match self {
            Self::Scalar(value) => *value,
            Self::Vector(values) if values.len() == 1 => values[0],
            Self::Vector(values) => values[index],
        }
    }

    /// Expand to a vector of the given length.
    ///
    /// Values of length one are repeated; vectors must already have the right length.
    pub fn to_vector(&self, length: usize) -> Result<Vec<f64>> {
        match self {
            Self::Vector(values) if values.len() == length => Ok(values.clone()),
            _ if self.len() == 1 => Ok(vec![self.get(0); length]),
            _ => bail!(
                "A vector of length {} cannot be used where length {length} is needed",
                self.len()
            ),
        }
    }

    /// All entries as a vector, a scalar becoming a vector of length one
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Scalar(value) => vec![*value],
            Self::Vector(values) => values.clone(),
        }
    }

    /// Add another value elementwise, broadcasting where needed
    pub fn try_add(&self, other: &Self) -> Result<Self> {
        let Some(shape) = self.shape().broadcast(other.shape()) else {
            bail!(
                "Cannot add values of lengths {} and {}",
                self.len(),
                other.len()
            );
        };

        Ok(match (self, other, shape) {
            (Self::Scalar(a), Self::Scalar(b), _) => Self::Scalar(a + b),
            (_, _, Shape::Scalar) => Self::Vector(vec![self.get(0) + other.get(0)]),
            (_, _, Shape::Vector(len)) => {
                Self::Vector((0..len).map(|i| self.get(i) + other.get(i)).collect())
            }
        })
    }

    /// The smallest entry
    pub fn min(&self) -> f64 {
        self.values().into_iter().fold(f64::INFINITY, f64::min)
    }

    /// The largest entry
    pub fn max(&self) -> f64 {
        self.values().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Numeric {
    fn from(values: Vec<f64>) -> Self {
        Self::Vector(values)
    }
}

impl From<&[f64]> for Numeric {
    fn from(values: &[f64]) -> Self {
        Self::Vector(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Numeric {
    fn from(values: [f64; N]) -> Self {
        Self::Vector(values.to_vec())
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Vector(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}
