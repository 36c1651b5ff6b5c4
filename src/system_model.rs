//! Models of an energy system over a selection of time steps.
use crate::math_model::MathModel;
use crate::math_model::variable::VariableId;
use crate::time::{TimeAxis, TimeData};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut};

/// Values of time-series variables at the end of the retained part of a previous model, by
/// variable label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeforeValues(IndexMap<String, f64>);

impl BeforeValues {
    /// Collect the before-values for the next model from a solved model.
    ///
    /// For ordinary time-series variables this is the value at the last retained step. Variables
    /// which include the boundary at the end of each step contribute the boundary value after the
    /// last retained step instead.
    ///
    /// # Arguments
    ///
    /// * `model` - The solved model
    /// * `real_nr_of_used_steps` - Number of steps of the model which are retained
    pub fn from_model(model: &SystemModel, real_nr_of_used_steps: usize) -> Result<Self> {
        ensure!(
            real_nr_of_used_steps > 0,
            "At least one step must be used to determine before-values"
        );

        let mut values = IndexMap::new();
        for variable in model.variables().filter(|v| v.is_time_series()) {
            let index = if variable.is_boundary_inclusive() {
                real_nr_of_used_steps
            } else {
                real_nr_of_used_steps - 1
            };
            let value = model
                .variable_result(variable.id())?
                .get(index)
                .with_context(|| {
                    format!(
                        "Variable {} has no value at index {index} to use as a before-value",
                        variable.label()
                    )
                })?;
            values.insert(variable.label().to_string(), value);
        }

        Ok(Self(values))
    }

    /// The before-value of a variable, if there is one
    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    /// Iterate over the labels and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(label, &value)| (label.as_str(), value))
    }

    /// Number of before-values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no before-values
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A [`MathModel`] covering a selection of the time steps of an energy system
#[derive(Debug)]
pub struct SystemModel {
    model: MathModel,
    time_indices: Vec<usize>,
    time_data: TimeData,
    real_nr_of_used_steps: Option<usize>,
    explicit_time_series: Option<IndexMap<String, Vec<f64>>>,
    before_values: Option<BeforeValues>,
    component_variables: Vec<VariableId>,
}

impl SystemModel {
    /// Create an empty model.
    ///
    /// # Arguments
    ///
    /// * `label` - Label of the model
    /// * `time_axis` - The time axis of the energy system
    /// * `time_indices` - Indices of the time axis covered by the model
    /// * `explicit_time_series` - Data to use instead of the raw data of the time series with the
    ///   given labels
    pub fn new(
        label: impl Into<String>,
        time_axis: &TimeAxis,
        time_indices: Vec<usize>,
        explicit_time_series: Option<IndexMap<String, Vec<f64>>>,
    ) -> Result<Self> {
        let time_data = time_axis.time_data(&time_indices)?;

        Ok(Self {
            model: MathModel::new(label),
            time_indices,
            time_data,
            real_nr_of_used_steps: None,
            explicit_time_series,
            before_values: None,
            component_variables: Vec::new(),
        })
    }

    /// Indices of the global time axis covered by this model
    pub fn time_indices(&self) -> &[usize] {
        &self.time_indices
    }

    /// Number of time steps covered by this model
    pub fn nr_of_time_steps(&self) -> usize {
        self.time_indices.len()
    }

    /// Time information for the covered steps
    pub fn time_data(&self) -> &TimeData {
        &self.time_data
    }

    /// Duration of each time step in hours
    pub fn dt_in_hours(&self) -> &[f64] {
        &self.time_data.dt_in_hours
    }

    /// Number of steps which are retained when results are combined with those of other models
    pub fn real_nr_of_used_steps(&self) -> Option<usize> {
        self.real_nr_of_used_steps
    }

    /// Set the number of steps which are retained
    pub fn set_real_nr_of_used_steps(&mut self, steps: usize) -> Result<()> {
        ensure!(
            (1..=self.nr_of_time_steps()).contains(&steps),
            "Model {} covers {} time steps, so {steps} steps cannot be used",
            self.label(),
            self.nr_of_time_steps()
        );
        self.real_nr_of_used_steps = Some(steps);

        Ok(())
    }

    /// Data substituting the raw data of time series, by label
    pub fn explicit_time_series(&self) -> Option<&IndexMap<String, Vec<f64>>> {
        self.explicit_time_series.as_ref()
    }

    /// Before-values overriding the defaults of the variables
    pub fn before_values(&self) -> Option<&BeforeValues> {
        self.before_values.as_ref()
    }

    /// Override the default before-values of variables
    pub fn set_before_values(&mut self, before_values: BeforeValues) {
        self.before_values = Some(before_values);
    }

    /// The value of a time-series variable before its first step.
    ///
    /// An override takes precedence over the default given when the variable was defined.
    pub fn before_value(&self, variable: VariableId) -> Option<f64> {
        let variable = self.variable(variable);
        self.before_values
            .as_ref()
            .and_then(|values| values.get(variable.label()))
            .or_else(|| variable.default_before_value())
    }

    /// Record variables as belonging to components of the energy system
    pub fn add_component_variables(&mut self, variables: impl IntoIterator<Item = VariableId>) {
        self.component_variables.extend(variables);
    }

    /// The variables created by components of the energy system
    pub fn component_variables(&self) -> &[VariableId] {
        &self.component_variables
    }
}

impl Deref for SystemModel {
    type Target = MathModel;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl DerefMut for SystemModel {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.model
    }
}
