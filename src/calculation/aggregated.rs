//! Modelling of an energy system on time series represented by typical periods.
use super::{AggregatedInfos, CalculationDurations, check_not_modeled};
use crate::aggregation::{
    AggregationParameters, Clusterer, ClusteringRequest, PeriodEqualization, check_clustering,
    index_vectors_of_clusters,
};
use crate::system::EnergySystem;
use crate::system_model::SystemModel;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use std::time::Instant;

/// Label of the temporary element equalising the periods
const EQUALIZATION_LABEL: &str = "aggregation";

/// Sum, minimum and maximum of a series
fn statistics(values: &[f64]) -> (f64, f64, f64) {
    let sum = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (sum, min, max)
}

/// Cluster the time series of the system and build a model on the clustered series.
///
/// A temporary element equalising the variables of periods represented by the same typical period
/// is added to the system.
pub(super) fn model(
    label: &str,
    system: &mut EnergySystem,
    time_indices: &[usize],
    parameters: &AggregationParameters,
    clusterer: &dyn Clusterer,
    durations: &mut CalculationDurations,
) -> Result<(SystemModel, AggregatedInfos)> {
    check_not_modeled(system)?;
    parameters.validate()?;
    let start_time = Instant::now();

    system.activate_time_series(time_indices, None)?;
    let time_data = system.time_axis().time_data(time_indices)?;
    let hours_per_time_step = time_data
        .equidistant_step_hours()
        .context("Time series cannot be aggregated")?;
    let steps_per_period = parameters.steps_per_period(hours_per_time_step)?;
    ensure!(
        time_indices.len() % steps_per_period == 0,
        "{} time steps cannot be divided into periods of {steps_per_period} steps",
        time_indices.len()
    );

    let mut series = IndexMap::new();
    let mut weights = IndexMap::new();
    for time_series in system.array_time_series() {
        series.insert(
            time_series.label().to_string(),
            time_series.active_data()?.values(),
        );
        if let Some(weight) = time_series.aggregation_weight() {
            weights.insert(time_series.label().to_string(), weight);
        }
    }
    let request = ClusteringRequest {
        series,
        weights,
        hours_per_time_step,
        hours_per_period: parameters.hours_per_period,
        nr_of_typical_periods: parameters.nr_of_typical_periods,
        use_extreme_periods: parameters.use_extreme_periods,
        peak_max: parameters.peak_max.clone(),
        peak_min: parameters.peak_min.clone(),
    };
    let nr_of_periods = time_indices.len() / steps_per_period;
    let clustering = clusterer.cluster(&request)?;
    check_clustering(&request, &clustering, nr_of_periods)?;

    for (series_label, original) in &request.series {
        let (sum_orig, min_orig, max_orig) = statistics(original);
        let (sum_agg, min_agg, max_agg) = statistics(&clustering.predicted[series_label]);
        log::info!(
            "Aggregated time series {series_label}: max {max_agg} (original {max_orig}), min \
             {min_agg} (original {min_orig}), sum {sum_agg} (original {sum_orig})"
        );
    }

    let index_vectors =
        index_vectors_of_clusters(&clustering.cluster_order, steps_per_period, time_indices.len())?;
    system.add_temporary_element(Box::new(PeriodEqualization::new(
        EQUALIZATION_LABEL,
        index_vectors,
        parameters,
    )))?;

    let explicit = if parameters.fix_binary_vars_only {
        None
    } else {
        Some(clustering.predicted)
    };
    system.finalize()?;
    durations.aggregation = start_time.elapsed().as_secs_f64();

    let modeling_start = Instant::now();
    let mut model = SystemModel::new(label, system.time_axis(), time_indices.to_vec(), explicit)?;
    system.do_modeling(&mut model)?;
    durations.modeling = modeling_start.elapsed().as_secs_f64();

    let infos = AggregatedInfos {
        parameters: parameters.clone(),
        periods_order: clustering.cluster_order,
    };

    Ok((model, infos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_statistics() {
        let (sum, min, max) = statistics(&[3.0, -1.0, 4.0]);
        assert_approx_eq!(f64, sum, 6.0);
        assert_approx_eq!(f64, min, -1.0);
        assert_approx_eq!(f64, max, 4.0);
    }
}
