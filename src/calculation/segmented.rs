//! Rolling-horizon solution of an energy system in overlapping windows.
//!
//! Each window covers `segment_length` time steps, of which the first `nr_of_used_steps` are
//! retained. The next window starts right after the retained steps and receives the values of the
//! time-series variables at that point as its before-values.
use super::results::ResultTree;
use super::{CalculationDurations, check_not_modeled};
use crate::math_model::solver::SolverSettings;
use crate::system::EnergySystem;
use crate::system_model::{BeforeValues, SystemModel};
use anyhow::{Context, Result, ensure};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Settings for a segmented calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, DocumentedFields, Serialize, Deserialize)]
pub struct SegmentedParameters {
    /// Number of time steps solved in each window, including the overlap with the next one
    pub segment_length: usize,
    /// Number of time steps retained from each window
    pub nr_of_used_steps: usize,
}

/// A window of a segmented calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentWindow {
    /// Position of the window
    pub index: usize,
    /// First time step of the window (position within the calculation's time indices)
    pub start: usize,
    /// Last time step of the window, inclusive
    pub end: usize,
    /// Number of time steps retained from the window
    pub real_nr_of_used_steps: usize,
}

impl SegmentWindow {
    /// Number of time steps solved in the window
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Whether the window has no time steps (never true for a planned window)
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Divide a number of time steps into windows.
///
/// There are `ceil(nr_of_time_steps / nr_of_used_steps)` windows. Window `i` starts at
/// `i * nr_of_used_steps` and ends `segment_length - 1` steps later, or at the last time step.
/// Every window but the last retains `nr_of_used_steps` steps; the last retains the rest.
pub fn plan_windows(
    nr_of_time_steps: usize,
    parameters: &SegmentedParameters,
) -> Result<Vec<SegmentWindow>> {
    let SegmentedParameters {
        segment_length,
        nr_of_used_steps,
    } = *parameters;
    ensure!(
        nr_of_used_steps > 0,
        "Number of used steps must be positive"
    );
    ensure!(
        nr_of_used_steps <= segment_length,
        "Number of used steps ({nr_of_used_steps}) must not exceed the segment length \
         ({segment_length})"
    );
    ensure!(
        segment_length <= nr_of_time_steps,
        "Segment length ({segment_length}) must not exceed the number of time steps \
         ({nr_of_time_steps})"
    );

    let nr_of_windows = nr_of_time_steps.div_ceil(nr_of_used_steps);
    let windows = (0..nr_of_windows)
        .map(|index| {
            let start = index * nr_of_used_steps;
            let end = (start + segment_length - 1).min(nr_of_time_steps - 1);
            let real_nr_of_used_steps = if index == nr_of_windows - 1 {
                end - start + 1
            } else {
                nr_of_used_steps
            };
            SegmentWindow {
                index,
                start,
                end,
                real_nr_of_used_steps,
            }
        })
        .collect();

    Ok(windows)
}

/// The outcome of a segmented calculation
#[derive(Debug)]
pub(super) struct SegmentedRun {
    pub models: Vec<SystemModel>,
    pub windows: Vec<SegmentWindow>,
    pub tree: ResultTree,
}

/// Model and solve every window in turn, combining the retained results.
///
/// Stops at the first window which cannot be solved.
pub(super) fn run_windows(
    label: &str,
    system: &mut EnergySystem,
    time_indices: &[usize],
    settings: &SolverSettings,
    parameters: &SegmentedParameters,
    durations: &mut CalculationDurations,
) -> Result<SegmentedRun> {
    check_not_modeled(system)?;
    let with_investment = system.elements_with_investment();
    ensure!(
        with_investment.is_empty(),
        "Segmented calculations cannot be used with investment decisions (elements: {})",
        with_investment.join(", ")
    );
    let windows = plan_windows(time_indices.len(), parameters)?;
    system.finalize()?;

    let start_time = Instant::now();
    let mut models: Vec<SystemModel> = Vec::with_capacity(windows.len());
    let mut tree = ResultTree::new();
    for window in &windows {
        log::info!(
            "Segment {} of {}: time steps {} to {} ({} retained)",
            window.index + 1,
            windows.len(),
            window.start,
            window.end,
            window.real_nr_of_used_steps
        );
        let indices = time_indices[window.start..=window.end].to_vec();
        let mut model = SystemModel::new(
            format!("{label}_seg{}", window.index),
            system.time_axis(),
            indices,
            None,
        )?;
        model.set_real_nr_of_used_steps(window.real_nr_of_used_steps)?;

        if let Some(previous) = models.last() {
            let used = previous
                .real_nr_of_used_steps()
                .context("Number of used steps of the previous segment is unknown")?;
            let before_values = BeforeValues::from_model(previous, used)?;
            for (variable, value) in before_values.iter() {
                log::debug!("Before-value of {variable}: {value}");
            }
            model.set_before_values(before_values);
        }

        let modeling_start = Instant::now();
        system
            .do_modeling(&mut model)
            .with_context(|| format!("Failed to model segment {}", window.index))?;
        durations.modeling += modeling_start.elapsed().as_secs_f64();

        let solving_start = Instant::now();
        model
            .solve(settings)
            .with_context(|| format!("Failed to solve segment {}", window.index))?;
        durations.solving += solving_start.elapsed().as_secs_f64();

        let retained = system
            .results(&model)?
            .retained(window.real_nr_of_used_steps, window.index == 0);
        if window.index == 0 {
            tree = retained;
        } else {
            tree.append(retained)
                .with_context(|| format!("Failed to combine results of segment {}", window.index))?;
        }
        models.push(model);
    }
    durations.total = start_time.elapsed().as_secs_f64();

    Ok(SegmentedRun {
        models,
        windows,
        tree,
    })
}
