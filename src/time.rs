//! The global time axis and the time-dependent input data of elements.
use crate::numeric::Numeric;
use anyhow::{Context, Result, bail, ensure};
use chrono::{NaiveDateTime, TimeDelta};
use itertools::Itertools;

/// Number of milliseconds in an hour
const MILLISECONDS_PER_HOUR: f64 = 3_600_000.0;

/// Tolerance used when checking that time steps are equidistant
const EQUIDISTANCE_TOLERANCE: f64 = 1e-9;

/// Length of the interval between two points in time, in hours
fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / MILLISECONDS_PER_HOUR
}

/// Convert a number of hours into a [`TimeDelta`]
#[allow(clippy::cast_possible_truncation)]
fn delta_from_hours(hours: f64) -> Result<TimeDelta> {
    let milliseconds = (hours * MILLISECONDS_PER_HOUR).round();
    ensure!(
        milliseconds.is_finite() && milliseconds > 0.0 && milliseconds < i64::MAX as f64,
        "Invalid time step duration: {hours} h"
    );

    TimeDelta::try_milliseconds(milliseconds as i64)
        .with_context(|| format!("Invalid time step duration: {hours} h"))
}

/// The time steps of an energy system.
///
/// Every model works on a selection of indices into this axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    timestamps: Vec<NaiveDateTime>,
    /// The point in time at which the last time step ends
    end: NaiveDateTime,
}

impl TimeAxis {
    /// Create a new time axis.
    ///
    /// # Arguments
    ///
    /// * `timestamps` - Start of each time step, strictly increasing
    /// * `last_time_step_hours` - Duration of the last time step. If `None`, the previous increment
    ///   is used.
    pub fn new(timestamps: Vec<NaiveDateTime>, last_time_step_hours: Option<f64>) -> Result<Self> {
        let Some(&last) = timestamps.last() else {
            bail!("Time axis must contain at least one time step");
        };
        for (i, (before, after)) in timestamps.iter().tuple_windows().enumerate() {
            ensure!(
                after > before,
                "Time stamps must be strictly increasing, but {after} follows {before} (index {})",
                i + 1
            );
        }

        let last_step = match (last_time_step_hours, timestamps.as_slice()) {
            (Some(hours), _) => delta_from_hours(hours)?,
            (None, [.., before, after]) => *after - *before,
            (None, _) => {
                bail!("Duration of the last time step must be given for a single time step")
            }
        };

        Ok(Self {
            end: last + last_step,
            timestamps,
        })
    }

    /// Create a time axis of `nr_of_steps` equal steps starting at `start`
    pub fn regular(start: NaiveDateTime, nr_of_steps: usize, step_hours: f64) -> Result<Self> {
        let step = delta_from_hours(step_hours)?;
        let timestamps = (0..nr_of_steps)
            .scan(start, |time, _| {
                let current = *time;
                *time = current + step;
                Some(current)
            })
            .collect();

        Self::new(timestamps, Some(step_hours))
    }

    /// Number of time steps
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether there are no time steps (never true for a constructed axis)
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Start of each time step
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Every index of the axis
    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    /// Get the time data for a selection of indices.
    ///
    /// The selection may skip indices, in which case each selected step lasts until the start of
    /// the next selected one.
    pub fn time_data(&self, indices: &[usize]) -> Result<TimeData> {
        let Some(&last) = indices.last() else {
            bail!("At least one time index must be selected");
        };
        for (before, after) in indices.iter().tuple_windows() {
            ensure!(
                after > before,
                "Time indices must be strictly increasing, but {after} follows {before}"
            );
        }
        ensure!(
            last < self.len(),
            "Time index {last} is out of range for a time axis with {} steps",
            self.len()
        );

        let time_series = indices.iter().map(|&i| self.timestamps[i]).collect_vec();
        let end = self.timestamps.get(last + 1).copied().unwrap_or(self.end);
        let time_series_with_end = time_series.iter().copied().chain([end]).collect_vec();
        let dt_in_hours = time_series_with_end
            .iter()
            .tuple_windows()
            .map(|(&start, &end)| hours_between(start, end))
            .collect_vec();
        let dt_in_hours_total = dt_in_hours.iter().sum();

        Ok(TimeData {
            time_series,
            time_series_with_end,
            dt_in_hours,
            dt_in_hours_total,
        })
    }
}

/// Time information for a selection of time steps
#[derive(Debug, Clone, PartialEq)]
pub struct TimeData {
    /// Start of each selected step
    pub time_series: Vec<NaiveDateTime>,
    /// As `time_series`, with the end of the last step appended
    pub time_series_with_end: Vec<NaiveDateTime>,
    /// Duration of each step in hours
    pub dt_in_hours: Vec<f64>,
    /// Sum of `dt_in_hours`
    pub dt_in_hours_total: f64,
}

impl TimeData {
    /// Number of time steps
    pub fn len(&self) -> usize {
        self.time_series.len()
    }

    /// Whether there are no time steps
    pub fn is_empty(&self) -> bool {
        self.time_series.is_empty()
    }

    /// Check that all steps have the same duration.
    ///
    /// # Returns
    ///
    /// The duration of one step in hours.
    pub fn equidistant_step_hours(&self) -> Result<f64> {
        let min = self.dt_in_hours.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self
            .dt_in_hours
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        ensure!(
            max - min <= EQUIDISTANCE_TOLERANCE,
            "Time steps must be equidistant, but their durations range from {min} h to {max} h"
        );

        Ok(min)
    }
}

/// Input data of an element which may vary over time.
///
/// Before an element is modelled, its time series are activated for the time indices of the
/// model, optionally substituting explicit values (e.g. the output of a clustering).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    label: String,
    data: Numeric,
    aggregation_weight: Option<f64>,
    active: Option<Numeric>,
}

impl TimeSeries {
    /// Create a new time series
    pub fn new(label: impl Into<String>, data: impl Into<Numeric>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
            aggregation_weight: None,
            active: None,
        }
    }

    /// Set the weight given to this series when clustering
    pub fn with_aggregation_weight(mut self, weight: f64) -> Self {
        self.aggregation_weight = Some(weight);
        self
    }

    /// Full label of the series
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The raw data covering the whole time axis
    pub fn data(&self) -> &Numeric {
        &self.data
    }

    /// Whether the data has one value per time step
    pub fn is_array(&self) -> bool {
        !self.data.is_scalar()
    }

    /// The weight given to this series when clustering
    pub fn aggregation_weight(&self) -> Option<f64> {
        self.aggregation_weight
    }

    /// Select the data for the given time indices.
    ///
    /// # Arguments
    ///
    /// * `indices` - Indices into the global time axis
    /// * `explicit` - Values to use instead of the raw data, one per index
    pub fn activate(&mut self, indices: &[usize], explicit: Option<&[f64]>) -> Result<()> {
        let active = match (explicit, &self.data) {
            (Some(values), _) => {
                ensure!(
                    values.len() == indices.len(),
                    "Explicit data for time series {} has {} values, but {} time steps are active",
                    self.label,
                    values.len(),
                    indices.len()
                );
                Numeric::Vector(values.to_vec())
            }
            (None, Numeric::Scalar(value)) => Numeric::Scalar(*value),
            (None, Numeric::Vector(values)) => Numeric::Vector(
                indices
                    .iter()
                    .map(|&i| {
                        values.get(i).copied().with_context(|| {
                            format!(
                                "Time series {} has {} values, but index {i} was requested",
                                self.label,
                                values.len()
                            )
                        })
                    })
                    .try_collect()?,
            ),
        };
        self.active = Some(active);

        Ok(())
    }

    /// The data for the currently active time indices
    pub fn active_data(&self) -> Result<&Numeric> {
        self.active
            .as_ref()
            .with_context(|| format!("Time series {} has not been activated", self.label))
    }
}
