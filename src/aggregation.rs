//! Time series aggregation: typical periods found by a clustering and the equalisation of the
//! variables of all periods represented by the same typical period.
//!
//! The clustering itself is provided by an implementation of [`Clusterer`].
use crate::element::{Element, Globals, Share, ShareCategory};
use crate::math_model::equation::{EquationId, EquationKind};
use crate::math_model::variable::{Variable, VariableId, VariableSpec};
use crate::system_model::SystemModel;
use anyhow::{Context, Result, ensure};
use documented::DocumentedFields;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tolerance when checking that a period consists of a whole number of time steps
const STEPS_PER_PERIOD_TOLERANCE: f64 = 1e-9;

/// Settings for an aggregated calculation
#[derive(Debug, Clone, PartialEq, DocumentedFields, Serialize, Deserialize)]
pub struct AggregationParameters {
    /// Length of a period in hours
    pub hours_per_period: f64,
    /// Number of typical periods
    pub nr_of_typical_periods: usize,
    /// Whether periods with extreme values are added as typical periods
    #[serde(default)]
    pub use_extreme_periods: bool,
    /// Whether storage charging and discharging flows are equalised too
    #[serde(default)]
    pub fix_storage_flows: bool,
    /// Whether only binary variables are equalised and the original time series are kept
    #[serde(default)]
    pub fix_binary_vars_only: bool,
    /// Percentage of the equalised values of binary variables which may deviate
    #[serde(default)]
    pub percentage_of_period_freedom: f64,
    /// Costs per deviating value, added to the standard effect
    #[serde(default)]
    pub costs_of_period_freedom: f64,
    /// Labels of time series whose period with the maximum value becomes a typical period
    #[serde(default)]
    pub peak_max: Vec<String>,
    /// Labels of time series whose period with the minimum value becomes a typical period
    #[serde(default)]
    pub peak_min: Vec<String>,
}

impl AggregationParameters {
    /// Create parameters with everything optional switched off
    pub fn new(hours_per_period: f64, nr_of_typical_periods: usize) -> Self {
        Self {
            hours_per_period,
            nr_of_typical_periods,
            use_extreme_periods: false,
            fix_storage_flows: false,
            fix_binary_vars_only: false,
            percentage_of_period_freedom: 0.0,
            costs_of_period_freedom: 0.0,
            peak_max: Vec::new(),
            peak_min: Vec::new(),
        }
    }

    /// Check that the parameters are usable
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.hours_per_period > 0.0,
            "Period length must be positive, but is {} h",
            self.hours_per_period
        );
        ensure!(
            self.nr_of_typical_periods > 0,
            "At least one typical period is needed"
        );
        ensure!(
            (0.0..=100.0).contains(&self.percentage_of_period_freedom),
            "Percentage of period freedom must be between 0 and 100, but is {}",
            self.percentage_of_period_freedom
        );

        Ok(())
    }

    /// Number of time steps per period
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn steps_per_period(&self, hours_per_time_step: f64) -> Result<usize> {
        let steps = self.hours_per_period / hours_per_time_step;
        ensure!(
            steps >= 1.0 && (steps - steps.round()).abs() < STEPS_PER_PERIOD_TOLERANCE,
            "Period length of {} h is not a multiple of the time step length of {hours_per_time_step} h",
            self.hours_per_period
        );

        Ok(steps.round() as usize)
    }
}

/// The input of a clustering
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringRequest {
    /// The time series to cluster, by label
    pub series: IndexMap<String, Vec<f64>>,
    /// Weights of the series, by label
    pub weights: IndexMap<String, f64>,
    /// Duration of a time step in hours
    pub hours_per_time_step: f64,
    /// Length of a period in hours
    pub hours_per_period: f64,
    /// Number of typical periods
    pub nr_of_typical_periods: usize,
    /// Whether periods with extreme values are added as typical periods
    pub use_extreme_periods: bool,
    /// Series whose period with the maximum value becomes a typical period
    pub peak_max: Vec<String>,
    /// Series whose period with the minimum value becomes a typical period
    pub peak_min: Vec<String>,
}

/// The output of a clustering
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// The typical period representing each period, in order
    pub cluster_order: Vec<usize>,
    /// The series as represented by the typical periods, with one value per time step
    pub predicted: IndexMap<String, Vec<f64>>,
}

/// Finds typical periods in a set of time series
pub trait Clusterer {
    /// Cluster the periods of the series
    fn cluster(&self, request: &ClusteringRequest) -> Result<Clustering>;
}

/// Check a clustering against its request
pub fn check_clustering(
    request: &ClusteringRequest,
    clustering: &Clustering,
    nr_of_periods: usize,
) -> Result<()> {
    ensure!(
        clustering.cluster_order.len() == nr_of_periods,
        "Clustering assigned {} periods, but there are {nr_of_periods}",
        clustering.cluster_order.len()
    );
    for (label, series) in &request.series {
        let predicted = clustering
            .predicted
            .get(label)
            .with_context(|| format!("Clustering returned no values for time series {label}"))?;
        ensure!(
            predicted.len() == series.len(),
            "Clustering returned {} values for time series {label}, but {} are needed",
            predicted.len(),
            series.len()
        );
    }

    Ok(())
}

/// The time indices of each period, grouped by the typical period representing them.
///
/// # Arguments
///
/// * `cluster_order` - The typical period representing each period
/// * `steps_per_period` - Number of time steps per period
/// * `nr_of_time_steps` - Number of time steps in total
///
/// # Returns
///
/// For each typical period (in order of first occurrence), the model-local time indices of every
/// period it represents.
pub fn index_vectors_of_clusters(
    cluster_order: &[usize],
    steps_per_period: usize,
    nr_of_time_steps: usize,
) -> Result<IndexMap<usize, Vec<Vec<usize>>>> {
    ensure!(steps_per_period > 0, "A period must have at least one step");
    ensure!(
        nr_of_time_steps % steps_per_period == 0,
        "{nr_of_time_steps} time steps cannot be divided into periods of {steps_per_period} steps"
    );
    ensure!(
        cluster_order.len() == nr_of_time_steps / steps_per_period,
        "{} periods were clustered, but there are {}",
        cluster_order.len(),
        nr_of_time_steps / steps_per_period
    );

    let mut index_vectors: IndexMap<usize, Vec<Vec<usize>>> = IndexMap::new();
    for (period, &cluster) in cluster_order.iter().enumerate() {
        let start = period * steps_per_period;
        index_vectors
            .entry(cluster)
            .or_default()
            .push((start..start + steps_per_period).collect());
    }

    Ok(index_vectors)
}

/// Pairs of indices to be equalised: the first period of each typical period against each of the
/// others
fn equalization_indices(
    index_vectors: &IndexMap<usize, Vec<Vec<usize>>>,
) -> (Vec<usize>, Vec<usize>) {
    let mut first = Vec::new();
    let mut other = Vec::new();
    for periods in index_vectors.values() {
        if let Some((reference, rest)) = periods.split_first() {
            for period in rest {
                first.extend(reference);
                other.extend(period);
            }
        }
    }

    (first, other)
}

/// A temporary element which equalises the variables of all periods represented by the same
/// typical period
#[derive(Debug)]
pub struct PeriodEqualization {
    label: String,
    index_vectors: IndexMap<usize, Vec<Vec<usize>>>,
    fix_storage_flows: bool,
    fix_binary_vars_only: bool,
    percentage_of_period_freedom: f64,
    costs_of_period_freedom: f64,
    corrections: Vec<VariableId>,
}

impl PeriodEqualization {
    /// Create the element for the given periods
    pub fn new(
        label: impl Into<String>,
        index_vectors: IndexMap<usize, Vec<Vec<usize>>>,
        parameters: &AggregationParameters,
    ) -> Self {
        Self {
            label: label.into(),
            index_vectors,
            fix_storage_flows: parameters.fix_storage_flows,
            fix_binary_vars_only: parameters.fix_binary_vars_only,
            percentage_of_period_freedom: parameters.percentage_of_period_freedom,
            costs_of_period_freedom: parameters.costs_of_period_freedom,
            corrections: Vec::new(),
        }
    }

    /// Whether a variable's values are equalised between periods
    fn is_equalized(&self, variable: &Variable, nr_of_time_steps: usize) -> bool {
        variable.is_time_series()
            && variable.len() == nr_of_time_steps
            && !variable.is_boundary_inclusive()
            && (self.fix_storage_flows || !variable.is_storage_flow())
            && (!self.fix_binary_vars_only || variable.is_binary())
    }

    /// Let a binary variable deviate from the equalisation at a limited number of indices.
    ///
    /// At most `percentage_of_period_freedom` percent of the equalised indices, rounded, may be
    /// corrected.
    ///
    /// # Arguments
    ///
    /// * `model` - The model
    /// * `equation` - The equalisation of the variable
    /// * `label` - Label of the variable
    /// * `length` - Length of the variable
    /// * `indices` - The indices of the variable which are equalised with those of another period
    fn add_corrections(
        &mut self,
        model: &mut SystemModel,
        equation: EquationId,
        label: &str,
        length: usize,
        indices: &[usize],
    ) -> Result<()> {
        let mut free = vec![Some(0.0); length];
        for &i in indices {
            free[i] = None;
        }

        let mut corrections = Vec::new();
        for (name, factor) in [("K_plus", 1.0), ("K_minus", -1.0)] {
            let spec = VariableSpec::time_series(
                format!("{}__{name}__{label}", self.label),
                format!("{name}__{label}"),
                length,
            )
            .binary()
            .fixed_partially(free.clone());
            let id = model.add_variable(spec)?;
            model.add_summand(equation, id, factor, Some(indices.to_vec()), false)?;
            corrections.push(id);
        }

        // Only one direction of correction per index
        let lock = model.add_equation(
            format!("{}__lock_corrections__{label}", self.label),
            EquationKind::Inequality,
        )?;
        for &id in &corrections {
            model.add_summand(lock, id, 1.0, Some(indices.to_vec()), false)?;
        }
        model.add_constant(lock, 1.0)?;

        // Limit the number of corrections
        let limit = model.add_equation(
            format!("{}__nr_of_corrections__{label}", self.label),
            EquationKind::Inequality,
        )?;
        for &id in &corrections {
            model.add_summand(limit, id, 1.0, Some(indices.to_vec()), true)?;
        }
        let max_corrections =
            (self.percentage_of_period_freedom / 100.0 * indices.len() as f64).round();
        model.add_constant(limit, max_corrections)?;

        self.corrections.extend(corrections);

        Ok(())
    }
}

impl Element for PeriodEqualization {
    fn label(&self) -> &str {
        &self.label
    }

    fn declare_vars_and_eqs(&mut self, _model: &mut SystemModel) -> Result<()> {
        self.corrections.clear();
        Ok(())
    }

    fn do_modeling(&mut self, model: &mut SystemModel) -> Result<()> {
        let (first, other) = equalization_indices(&self.index_vectors);
        if first.is_empty() {
            log::info!("No period is represented by another, so nothing is equalised");
            return Ok(());
        }

        let nr_of_time_steps = model.nr_of_time_steps();
        let variables: Vec<_> = model
            .component_variables()
            .iter()
            .copied()
            .filter(|&id| self.is_equalized(model.variable(id), nr_of_time_steps))
            .collect();
        for id in variables {
            let variable = model.variable(id);
            let label = variable.label().to_string();
            let (is_binary, length) = (variable.is_binary(), variable.len());

            // var[first period] - var[other period] = 0
            let equation = model.add_equation(
                format!("{}__equalize__{label}", self.label),
                EquationKind::Equality,
            )?;
            model.add_summand(equation, id, 1.0, Some(first.clone()), false)?;
            model.add_summand(equation, id, -1.0, Some(other.clone()), false)?;

            if is_binary && self.percentage_of_period_freedom > 0.0 {
                self.add_corrections(model, equation, &label, length, &other)?;
            }
            log::debug!("Equalised variable {label} over {} periods", other.len());
        }

        Ok(())
    }

    fn add_share_to_globals(
        &mut self,
        globals: &mut dyn Globals,
        model: &mut SystemModel,
    ) -> Result<()> {
        if self.costs_of_period_freedom == 0.0 {
            return Ok(());
        }

        for &id in &self.corrections {
            let share = Share::of_variable(
                format!(
                    "{}__costs_of_period_freedom__{}",
                    self.label,
                    model.variable(id).label_short()
                ),
                None,
                ShareCategory::Operation,
                id,
                self.costs_of_period_freedom,
            );
            globals.add_share(model, share)?;
        }

        Ok(())
    }

    fn variables(&self) -> Vec<VariableId> {
        self.corrections.clone()
    }
}
