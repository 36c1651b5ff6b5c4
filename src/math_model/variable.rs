//! Decision variables, either scalar or one value per time step.
use crate::numeric::Numeric;
use anyhow::{Result, ensure};
use itertools::Itertools;
use std::cell::OnceCell;

/// Maximum number of characters of a value shown in descriptions
const MAX_DESCRIPTION_VALUE_LENGTH: usize = 60;

/// Identifies a variable within the model which created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("v{_0}")]
pub struct VariableId(pub(crate) usize);

/// Whether a variable is a plain value or a time series with a predecessor value
#[derive(Debug, Clone, PartialEq)]
pub enum VariableKind {
    /// A single decision value (e.g. an investment size)
    Scalar,
    /// A per-time-step decision value
    TimeSeries {
        /// Default value at index −1, used unless an override is given for the model
        before_value: Option<f64>,
        /// Whether the before-value is the first entry of the series itself, in which case the
        /// series has one entry more than there are time steps
        before_value_is_start_value: bool,
    },
}

/// The solved values of a variable
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    /// Values of a continuous variable
    Continuous(Vec<f64>),
    /// Values of a binary variable
    Binary(Vec<u8>),
}

impl ResultValue {
    /// Convert raw solver output into result values, rounding binary values to 0 or 1
    pub(crate) fn from_solution(values: Vec<f64>, binary: bool) -> Self {
        if binary {
            Self::Binary(values.into_iter().map(|v| u8::from(v > 0.5)).collect())
        } else {
            Self::Continuous(values)
        }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(values) => values.len(),
            Self::Binary(values) => values.len(),
        }
    }

    /// Whether there are no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `index`, if present
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            Self::Continuous(values) => values.get(index).copied(),
            Self::Binary(values) => values.get(index).map(|&v| f64::from(v)),
        }
    }

    /// All values as floating point numbers
    pub fn to_f64(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// The result as a [`Numeric`], collapsing results of length one to a scalar
    pub fn to_numeric(&self) -> Numeric {
        match self.to_f64().as_slice() {
            [value] => Numeric::Scalar(*value),
            values => Numeric::Vector(values.to_vec()),
        }
    }
}

/// Definition of a variable before it is added to a model.
///
/// Use [`VariableSpec::scalar`] or [`VariableSpec::time_series`] and the builder methods, then
/// pass the spec to [`crate::math_model::MathModel::add_variable`].
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    label: String,
    label_short: String,
    length: usize,
    binary: bool,
    lower_bound: Option<Numeric>,
    upper_bound: Option<Numeric>,
    fixed_value: Option<Vec<Option<f64>>>,
    kind: VariableKind,
    storage_flow: bool,
}

impl VariableSpec {
    /// A scalar variable
    pub fn scalar(label: impl Into<String>, label_short: impl Into<String>) -> Self {
        Self::new(label.into(), label_short.into(), 1, VariableKind::Scalar)
    }

    /// A variable with `length` entries, one per time step (or one more if it has a start value)
    pub fn time_series(
        label: impl Into<String>,
        label_short: impl Into<String>,
        length: usize,
    ) -> Self {
        Self::new(
            label.into(),
            label_short.into(),
            length,
            VariableKind::TimeSeries {
                before_value: None,
                before_value_is_start_value: false,
            },
        )
    }

    fn new(label: String, label_short: String, length: usize, kind: VariableKind) -> Self {
        Self {
            label,
            label_short,
            length,
            binary: false,
            lower_bound: None,
            upper_bound: None,
            fixed_value: None,
            kind,
            storage_flow: false,
        }
    }

    /// Restrict the variable to 0 or 1
    pub fn binary(mut self) -> Self {
        self.binary = true;
        self
    }

    /// Set a lower bound
    pub fn lower_bound(mut self, bound: impl Into<Numeric>) -> Self {
        self.lower_bound = Some(bound.into());
        self
    }

    /// Set an upper bound
    pub fn upper_bound(mut self, bound: impl Into<Numeric>) -> Self {
        self.upper_bound = Some(bound.into());
        self
    }

    /// Set both bounds
    pub fn bounds(self, lower: impl Into<Numeric>, upper: impl Into<Numeric>) -> Self {
        self.lower_bound(lower).upper_bound(upper)
    }

    /// Fix the variable to the given value(s)
    pub fn fixed(mut self, value: impl Into<Numeric>) -> Self {
        self.fixed_value = Some(value.into().values().into_iter().map(Some).collect());
        self
    }

    /// Fix some entries of the variable, leaving those given as `None` free within their bounds
    pub fn fixed_partially(mut self, values: Vec<Option<f64>>) -> Self {
        self.fixed_value = Some(values);
        self
    }

    /// Set the default before-value of a time-series variable.
    ///
    /// If `is_start_value` is set, the value applies to the first entry of the series itself
    /// (e.g. a storage charge state at the start of the first step).
    ///
    /// Has no effect on scalar variables.
    pub fn before_value(mut self, value: Option<f64>, is_start_value: bool) -> Self {
        if let VariableKind::TimeSeries {
            before_value,
            before_value_is_start_value,
        } = &mut self.kind
        {
            *before_value = value;
            *before_value_is_start_value = is_start_value;
        }
        self
    }

    /// Mark the variable as a storage charging or discharging flow
    pub fn storage_flow(mut self) -> Self {
        self.storage_flow = true;
        self
    }

    /// Validate the definition and create the variable
    pub(crate) fn build(self, id: VariableId) -> Result<Variable> {
        let label = self.label;
        ensure!(self.length > 0, "Variable {label} must have at least one entry");

        for (name, bound) in [("lower", &self.lower_bound), ("upper", &self.upper_bound)] {
            if let Some(bound) = bound {
                ensure!(
                    bound.len() == 1 || bound.len() == self.length,
                    "The {name} bound of variable {label} has {} values, but the variable has \
                     length {}",
                    bound.len(),
                    self.length
                );
            }
        }

        let fixed_value = match self.fixed_value {
            Some(values) if values.len() == 1 => Some(vec![values[0]; self.length]),
            Some(values) => {
                ensure!(
                    values.len() == self.length,
                    "The fixed value of variable {label} has {} values, but the variable has \
                     length {}",
                    values.len(),
                    self.length
                );
                Some(values)
            }
            None => None,
        };

        if let Some(values) = &fixed_value {
            let inside_bounds = values.iter().enumerate().all(|(i, value)| {
                value.is_none_or(|value| {
                    self.lower_bound.as_ref().is_none_or(|lb| value >= lb.get(i))
                        && self.upper_bound.as_ref().is_none_or(|ub| value <= ub.get(i))
                })
            });
            ensure!(
                inside_bounds,
                "Fixed value of variable {label} is not inside its bounds: value={}, lower={}, \
                 upper={}",
                format_optional_values(values),
                format_bound(self.lower_bound.as_ref()),
                format_bound(self.upper_bound.as_ref())
            );
        }

        log::debug!("Variable created: {label}");

        Ok(Variable {
            id,
            label,
            label_short: self.label_short,
            length: self.length,
            binary: self.binary,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            fixed_value,
            kind: self.kind,
            storage_flow: self.storage_flow,
            result: OnceCell::new(),
        })
    }
}

fn format_bound(bound: Option<&Numeric>) -> String {
    bound.map_or_else(|| "None".to_string(), ToString::to_string)
}

fn format_optional_values(values: &[Option<f64>]) -> String {
    let inner = values
        .iter()
        .map(|value| value.map_or_else(|| "None".to_string(), |v| v.to_string()))
        .join(", ");
    format!("[{inner}]")
}

/// A decision variable registered in a model
#[derive(Debug)]
pub struct Variable {
    id: VariableId,
    label: String,
    label_short: String,
    length: usize,
    binary: bool,
    lower_bound: Option<Numeric>,
    upper_bound: Option<Numeric>,
    fixed_value: Option<Vec<Option<f64>>>,
    kind: VariableKind,
    storage_flow: bool,
    result: OnceCell<ResultValue>,
}

impl Variable {
    /// Identifier within the owning model
    pub fn id(&self) -> VariableId {
        self.id
    }

    /// Full label, unique within the model
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label within the owning element
    pub fn label_short(&self) -> &str {
        &self.label_short
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether there are no entries (never true for a built variable)
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the variable is restricted to 0 or 1
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Whether the variable was given fixed values
    pub fn is_fixed(&self) -> bool {
        self.fixed_value.is_some()
    }

    /// Whether this is a time-series variable
    pub fn is_time_series(&self) -> bool {
        matches!(self.kind, VariableKind::TimeSeries { .. })
    }

    /// Whether the series includes the value at the end of the last time step
    pub fn is_boundary_inclusive(&self) -> bool {
        matches!(
            self.kind,
            VariableKind::TimeSeries {
                before_value_is_start_value: true,
                ..
            }
        )
    }

    /// Whether the variable is a storage charging or discharging flow
    pub fn is_storage_flow(&self) -> bool {
        self.storage_flow
    }

    /// The kind of variable
    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    /// The before-value given when the variable was defined
    pub fn default_before_value(&self) -> Option<f64> {
        match self.kind {
            VariableKind::TimeSeries { before_value, .. } => before_value,
            VariableKind::Scalar => None,
        }
    }

    /// Bounds of the entry at `index`, with a fixed value overriding both
    pub fn bounds_at(&self, index: usize) -> (Option<f64>, Option<f64>) {
        if let Some(value) = self.fixed_value.as_ref().and_then(|values| values[index]) {
            return (Some(value), Some(value));
        }

        let lower = self.lower_bound.as_ref().map(|lb| lb.get(index));
        let upper = self.upper_bound.as_ref().map(|ub| ub.get(index));
        if self.binary {
            (
                Some(lower.map_or(0.0, |lb| lb.max(0.0))),
                Some(upper.map_or(1.0, |ub| ub.min(1.0))),
            )
        } else {
            (lower, upper)
        }
    }

    /// The cached result, if it has been retrieved since the last solve
    pub fn result(&self) -> Option<&ResultValue> {
        self.result.get()
    }

    /// Store the solved values unless a result is already cached
    pub(crate) fn cache_result(&self, values: Vec<f64>) -> &ResultValue {
        self.result
            .get_or_init(|| ResultValue::from_solution(values, self.binary))
    }

    /// Clear the cached result
    pub fn reset_result(&mut self) {
        self.result.take();
    }

    /// One-line human-readable description
    pub fn description(&self) -> String {
        let bin_type = if self.binary { "bin" } else { "   " };
        let header = format!("Var {bin_type} x {:<6} \"{}\"", self.length, self.label);
        let body = match &self.fixed_value {
            Some(values) => format!("fixed={:<10}", truncate(&format_optional_values(values))),
            None => format!(
                "min={:<10}, max={:<10}",
                truncate(&format_bound(self.lower_bound.as_ref())),
                truncate(&format_bound(self.upper_bound.as_ref()))
            ),
        };

        format!("{header:<40}: {body}")
    }
}

fn truncate(value: &str) -> String {
    value.chars().take(MAX_DESCRIPTION_VALUE_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;

    #[test]
    fn test_variable_id_display() {
        assert_eq!(VariableId(3).to_string(), "v3");
    }

    #[rstest]
    #[case(5.0, true)]
    #[case(0.0, true)]
    #[case(10.0, true)]
    #[case(-0.1, false)]
    #[case(10.1, false)]
    fn test_fixed_value_inside_bounds(#[case] value: f64, #[case] ok: bool) {
        let result = VariableSpec::scalar("x", "x")
            .bounds(0.0, 10.0)
            .fixed(value)
            .build(VariableId(0));
        assert_eq!(result.is_ok(), ok);
    }

    #[test]
    fn test_fixed_value_elementwise() {
        let spec = VariableSpec::time_series("x", "x", 3)
            .bounds(0.0, vec![1.0, 2.0, 3.0])
            .fixed(vec![1.0, 2.5, 3.0]);
        assert_error!(
            spec.build(VariableId(0)),
            "Fixed value of variable x is not inside its bounds: value=[1, 2.5, 3], lower=0, \
             upper=[1, 2, 3]"
        );
    }

    #[test]
    fn test_fixed_partially_skips_none() {
        let variable = VariableSpec::time_series("x", "x", 3)
            .bounds(0.0, 1.0)
            .fixed_partially(vec![Some(0.0), None, Some(1.0)])
            .build(VariableId(0))
            .unwrap();
        assert_eq!(variable.bounds_at(0), (Some(0.0), Some(0.0)));
        assert_eq!(variable.bounds_at(1), (Some(0.0), Some(1.0)));
        assert_eq!(variable.bounds_at(2), (Some(1.0), Some(1.0)));
    }

    #[test]
    fn test_bound_length_mismatch() {
        assert_error!(
            VariableSpec::time_series("x", "x", 3)
                .upper_bound(vec![1.0, 2.0])
                .build(VariableId(0)),
            "The upper bound of variable x has 2 values, but the variable has length 3"
        );
    }

    #[test]
    fn test_binary_bounds() {
        let variable = VariableSpec::time_series("on", "on", 2)
            .binary()
            .build(VariableId(0))
            .unwrap();
        assert_eq!(variable.bounds_at(1), (Some(0.0), Some(1.0)));
    }

    #[test]
    fn test_boundary_inclusive() {
        let variable = VariableSpec::time_series("charge_state", "charge_state", 4)
            .before_value(Some(0.0), true)
            .build(VariableId(0))
            .unwrap();
        assert!(variable.is_time_series());
        assert!(variable.is_boundary_inclusive());
        assert_eq!(variable.default_before_value(), Some(0.0));

        let scalar = VariableSpec::scalar("size", "size")
            .before_value(Some(1.0), true)
            .build(VariableId(1))
            .unwrap();
        assert!(!scalar.is_boundary_inclusive());
        assert_eq!(scalar.default_before_value(), None);
    }

    #[test]
    fn test_result_cached_once() {
        let mut variable = VariableSpec::time_series("on", "on", 3)
            .binary()
            .build(VariableId(0))
            .unwrap();
        assert!(variable.result().is_none());

        let first = variable.cache_result(vec![0.0, 1.0, 0.9999]).clone();
        assert_eq!(first, ResultValue::Binary(vec![0, 1, 1]));

        // A second call does not replace the cached values
        assert_eq!(variable.cache_result(vec![1.0, 1.0, 1.0]), &first);

        variable.reset_result();
        assert!(variable.result().is_none());
    }

    #[test]
    fn test_result_to_numeric() {
        assert_eq!(
            ResultValue::Continuous(vec![2.0]).to_numeric(),
            Numeric::Scalar(2.0)
        );
        assert_eq!(
            ResultValue::Binary(vec![0, 1]).to_numeric(),
            Numeric::Vector(vec![0.0, 1.0])
        );
    }

    #[test]
    fn test_description() {
        let variable = VariableSpec::scalar("Boiler__size", "size")
            .bounds(0.0, 50.0)
            .build(VariableId(0))
            .unwrap();
        assert_eq!(
            variable.description(),
            format!("{:<40}: min=0         , max=50        ", "Var     x 1      \"Boiler__size\"")
        );
    }
}
