//! Calculations: building models of an energy system, solving them and collecting the results.
//!
//! A [`Calculation`] is modelled exactly once, in one of three ways:
//!
//! * [`Calculation::model_full`] builds a single model over all selected time steps
//! * [`Calculation::model_aggregated`] builds a single model on time series represented by typical
//!   periods
//! * [`Calculation::run_segmented`] solves overlapping windows one after another
//!
//! Each of these consumes the calculation, so a calculation cannot be modelled twice.
use crate::aggregation::{AggregationParameters, Clusterer};
use crate::math_model::ModelInfos;
use crate::math_model::solver::SolverSettings;
use crate::system::EnergySystem;
use crate::system_model::SystemModel;
use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use strum::{Display, EnumString};

pub mod aggregated;
pub mod results;
pub mod segmented;
use results::CalculationResults;
use segmented::{SegmentWindow, SegmentedParameters};

/// How a calculation is modelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CalculationMode {
    /// A single model over all time steps
    Full,
    /// Overlapping windows solved one after another
    Segmented,
    /// A single model on aggregated time series
    Aggregated,
}

/// Time spent on the stages of a calculation, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationDurations {
    /// Clustering the time series
    pub aggregation: f64,
    /// Building the models
    pub modeling: f64,
    /// Solving the models
    pub solving: f64,
    /// Everything together
    pub total: f64,
}

/// General information about a calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSummary {
    /// Name of the calculation
    pub name: String,
    /// How the calculation was modelled
    pub mode: CalculationMode,
    /// Number of time steps covered
    pub nr_of_time_indices: usize,
    /// Time spent on the stages of the calculation
    pub durations: CalculationDurations,
}

/// Properties of a segmented calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedInfos {
    /// The parameters the calculation was run with
    pub parameters: SegmentedParameters,
    /// The windows which were solved
    pub windows: Vec<SegmentWindow>,
}

/// Properties of an aggregated calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedInfos {
    /// The parameters the calculation was run with
    pub parameters: AggregationParameters,
    /// The typical period representing each period
    pub periods_order: Vec<usize>,
}

/// Information about a calculation, as written to the info document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationInfos {
    /// General information
    pub calculation: CalculationSummary,
    /// Properties of a segmented calculation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmented: Option<SegmentedInfos>,
    /// Properties of an aggregated calculation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<AggregatedInfos>,
    /// Information about each model
    pub system_models: Vec<ModelInfos>,
}

/// Fail if a previous calculation left temporary elements in the system
fn check_not_modeled(system: &EnergySystem) -> Result<()> {
    ensure!(
        !system.has_temporary_elements(),
        "The energy system still has temporary elements from a previous calculation ({}). \
         Delete them before modelling it again.",
        system.temporary_element_labels().join(", ")
    );

    Ok(())
}

/// A calculation which has not been modelled yet
#[derive(Debug)]
pub struct Calculation<'a> {
    name: String,
    system: &'a mut EnergySystem,
    time_indices: Vec<usize>,
}

impl<'a> Calculation<'a> {
    /// Create a calculation.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the calculation
    /// * `system` - The energy system
    /// * `time_indices` - Indices of the system's time axis to use. If `None`, all are used.
    pub fn new(
        name: impl Into<String>,
        system: &'a mut EnergySystem,
        time_indices: Option<Vec<usize>>,
    ) -> Result<Self> {
        let time_indices = time_indices.unwrap_or_else(|| system.time_axis().all_indices());
        // Check the selection
        system.time_axis().time_data(&time_indices)?;

        Ok(Self {
            name: name.into(),
            system,
            time_indices,
        })
    }

    /// Name of the calculation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The time indices covered by the calculation
    pub fn time_indices(&self) -> &[usize] {
        &self.time_indices
    }

    /// Build a single model over all time steps
    pub fn model_full(self) -> Result<ModeledCalculation<'a>> {
        check_not_modeled(self.system)?;
        self.system.finalize()?;

        let mut durations = CalculationDurations::default();
        let start = Instant::now();
        let mut model = SystemModel::new(
            self.name.as_str(),
            self.system.time_axis(),
            self.time_indices.clone(),
            None,
        )?;
        self.system.do_modeling(&mut model)?;
        durations.modeling = start.elapsed().as_secs_f64();
        log::info!("Modelled calculation {} in {:.2} s", self.name, durations.modeling);

        Ok(ModeledCalculation {
            name: self.name,
            mode: CalculationMode::Full,
            system: self.system,
            time_indices: self.time_indices,
            model,
            durations,
            aggregated: None,
        })
    }

    /// Build a single model on time series represented by typical periods.
    ///
    /// The periods of the time series are clustered by `clusterer`. A temporary element which
    /// equalises the variables of all periods represented by the same typical period is added to
    /// the system; it has to be deleted before the system can be modelled again.
    pub fn model_aggregated(
        self,
        parameters: &AggregationParameters,
        clusterer: &dyn Clusterer,
    ) -> Result<ModeledCalculation<'a>> {
        let mut durations = CalculationDurations::default();
        let (model, infos) = aggregated::model(
            &self.name,
            self.system,
            &self.time_indices,
            parameters,
            clusterer,
            &mut durations,
        )?;
        log::info!(
            "Modelled aggregated calculation {} in {:.2} s",
            self.name,
            durations.aggregation + durations.modeling
        );

        Ok(ModeledCalculation {
            name: self.name,
            mode: CalculationMode::Aggregated,
            system: self.system,
            time_indices: self.time_indices,
            model,
            durations,
            aggregated: Some(infos),
        })
    }

    /// Solve the time steps in overlapping windows, one after another.
    ///
    /// The values of time-series variables at the end of the retained part of a window are the
    /// before-values of the next window. Fails if any element has investment decisions, or as soon
    /// as a window cannot be solved.
    pub fn run_segmented(
        self,
        settings: &SolverSettings,
        parameters: &SegmentedParameters,
    ) -> Result<SolvedCalculation> {
        let mut durations = CalculationDurations::default();
        let run = segmented::run_windows(
            &self.name,
            self.system,
            &self.time_indices,
            settings,
            parameters,
            &mut durations,
        )?;

        let time = self.system.time_axis().time_data(&self.time_indices)?;
        let infos = CalculationInfos {
            calculation: CalculationSummary {
                name: self.name.clone(),
                mode: CalculationMode::Segmented,
                nr_of_time_indices: self.time_indices.len(),
                durations,
            },
            segmented: Some(SegmentedInfos {
                parameters: *parameters,
                windows: run.windows,
            }),
            aggregated: None,
            system_models: run.models.iter().map(|model| model.infos()).collect(),
        };

        Ok(SolvedCalculation {
            name: self.name,
            results: CalculationResults {
                tree: run.tree,
                time,
            },
            infos,
            models: run.models,
        })
    }
}

/// A calculation with a single model, ready to be solved
#[derive(Debug)]
pub struct ModeledCalculation<'a> {
    name: String,
    mode: CalculationMode,
    system: &'a mut EnergySystem,
    time_indices: Vec<usize>,
    model: SystemModel,
    durations: CalculationDurations,
    aggregated: Option<AggregatedInfos>,
}

impl ModeledCalculation<'_> {
    /// How the calculation was modelled
    pub fn mode(&self) -> CalculationMode {
        self.mode
    }

    /// The model
    pub fn model(&self) -> &SystemModel {
        &self.model
    }

    /// Solve the model and collect the results of all elements
    pub fn solve(mut self, settings: &SolverSettings) -> Result<SolvedCalculation> {
        let start = Instant::now();
        self.model.solve(settings)?;
        self.durations.solving = start.elapsed().as_secs_f64();
        self.durations.total =
            self.durations.aggregation + self.durations.modeling + self.durations.solving;

        let results = CalculationResults {
            tree: self.system.results(&self.model)?,
            time: self.system.time_axis().time_data(&self.time_indices)?,
        };
        let infos = CalculationInfos {
            calculation: CalculationSummary {
                name: self.name.clone(),
                mode: self.mode,
                nr_of_time_indices: self.time_indices.len(),
                durations: self.durations,
            },
            segmented: None,
            aggregated: self.aggregated,
            system_models: vec![self.model.infos()],
        };

        Ok(SolvedCalculation {
            name: self.name,
            results,
            infos,
            models: vec![self.model],
        })
    }
}

/// A solved calculation
#[derive(Debug)]
pub struct SolvedCalculation {
    name: String,
    results: CalculationResults,
    infos: CalculationInfos,
    models: Vec<SystemModel>,
}

impl SolvedCalculation {
    /// Name of the calculation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The results of all elements
    pub fn results(&self) -> &CalculationResults {
        &self.results
    }

    /// Information about the calculation and its models
    pub fn infos(&self) -> &CalculationInfos {
        &self.infos
    }

    /// The solved models; one per window for segmented calculations
    pub fn models(&self) -> &[SystemModel] {
        &self.models
    }

    /// The sum of the objective values of all models.
    ///
    /// For segmented calculations this adds up the objectives of whole windows, so steps in the
    /// overlap of two windows count more than once. It is not the total of the stitched results.
    pub fn objective_value(&self) -> f64 {
        self.models
            .iter()
            .filter_map(|model| model.objective_value())
            .sum()
    }

    /// Write the info and results documents to `output_dir`.
    ///
    /// Existing documents of a calculation with the same name are only replaced if `overwrite` is
    /// set.
    pub fn save(&self, output_dir: &Path, overwrite: bool) -> Result<()> {
        crate::output::save_calculation(
            output_dir,
            &self.name,
            &self.infos,
            &self.results,
            overwrite,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_calculation_mode() {
        assert_eq!(CalculationMode::Segmented.to_string(), "segmented");
        assert_eq!(
            CalculationMode::from_str("aggregated").unwrap(),
            CalculationMode::Aggregated
        );
    }

    #[test]
    fn test_infos_to_toml() {
        let infos = CalculationInfos {
            calculation: CalculationSummary {
                name: "test".into(),
                mode: CalculationMode::Segmented,
                nr_of_time_indices: 9,
                durations: CalculationDurations::default(),
            },
            segmented: Some(SegmentedInfos {
                parameters: SegmentedParameters {
                    segment_length: 3,
                    nr_of_used_steps: 3,
                },
                windows: segmented::plan_windows(
                    9,
                    &SegmentedParameters {
                        segment_length: 3,
                        nr_of_used_steps: 3,
                    },
                )
                .unwrap(),
            }),
            aggregated: None,
            system_models: Vec::new(),
        };
        let text = toml::to_string(&infos).unwrap();
        assert!(text.contains("mode = \"segmented\""));
        let read: CalculationInfos = toml::from_str(&text).unwrap();
        assert_eq!(read, infos);
    }
}
