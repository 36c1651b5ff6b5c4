//! Segmented calculations of the reference system.
use flowopt::calculation::segmented::SegmentedParameters;
use flowopt::calculation::{Calculation, CalculationMode};
use flowopt::math_model::solver::SolverSettings;

use demo_system::*;

/// Total costs of the reference system without investment
const EXPECTED_COSTS: f64 = 61.88394666666667;
/// Relative tolerance in percent
const TOLERANCE: f64 = 0.011;

fn total_costs(tree: &flowopt::calculation::results::ResultTree) -> f64 {
    values(tree, &["Effects", "costs", "operation", "sum_TS"])
        .iter()
        .sum()
}

#[test]
fn test_single_segment_matches_full_calculation() {
    let mut system = reference_system(time_axis(), false);
    let parameters = SegmentedParameters {
        segment_length: 9,
        nr_of_used_steps: 9,
    };
    let solved = Calculation::new("single", &mut system, None)
        .unwrap()
        .run_segmented(&SolverSettings::default(), &parameters)
        .unwrap();

    assert_eq!(solved.models().len(), 1);
    assert_close(total_costs(&solved.results().tree), EXPECTED_COSTS, TOLERANCE);
    assert_close(solved.objective_value(), EXPECTED_COSTS, TOLERANCE);
}

#[test]
fn test_overlapping_segments() {
    let mut system = reference_system(time_axis(), false);
    let parameters = SegmentedParameters {
        segment_length: 4,
        nr_of_used_steps: 2,
    };
    let solved = Calculation::new("rolling", &mut system, None)
        .unwrap()
        .run_segmented(&SolverSettings::default(), &parameters)
        .unwrap();
    let tree = &solved.results().tree;
    let n = HEAT_LOAD.len();

    let infos = solved.infos();
    assert_eq!(infos.calculation.mode, CalculationMode::Segmented);
    let segmented = infos.segmented.as_ref().unwrap();
    assert_eq!(segmented.windows.len(), 5);
    assert_eq!(infos.system_models.len(), 5);
    assert_eq!(solved.models()[1].label(), "rolling_seg1");

    // Retained results cover every step exactly once
    let charge_state = values(tree, &["Speicher", "charge_state"]);
    let charging = values(tree, &["Speicher", "Q_th_load", "val"]);
    let discharging = values(tree, &["Speicher", "Q_th_unload", "val"]);
    let boiler = values(tree, &["Boiler", "Q_th", "val"]);
    let chp = values(tree, &["CHP_unit", "Q_th", "val"]);
    let load = values(tree, &["Waermelast", "Q_th_Last", "val"]);
    let excess_input = values(tree, &["heat", "excess_input"]);
    let excess_output = values(tree, &["heat", "excess_output"]);
    assert_eq!(charge_state.len(), n + 1);
    assert_eq!(boiler.len(), n);
    assert_all_close(&load, &HEAT_LOAD);
    assert!(charge_state[0].abs() < 1e-6);

    for t in 0..n {
        // The charge state continues across window boundaries
        let expected = charge_state[t] * (1.0 - 0.08) + charging[t] * 0.9 - discharging[t];
        assert!(
            (charge_state[t + 1] - expected).abs() < 1e-5,
            "Charge state at step {t} is not continuous"
        );

        let balance = boiler[t] + chp[t] + discharging[t] - charging[t] - load[t]
            + excess_input[t]
            - excess_output[t];
        assert!(balance.abs() < 1e-5, "Heat is not balanced at step {t}");
    }

    // The second window starts where the retained part of the first ended
    let before_values = solved.models()[1].before_values().unwrap();
    let start = before_values.get("Speicher__charge_state").unwrap();
    assert!((start - charge_state[2]).abs() < 1e-6);

    // Looking ahead less cannot beat the full optimum
    assert!(total_costs(tree) >= EXPECTED_COSTS * (1.0 - 1e-4));

    // The objective adds up whole windows, overlap included
    let window_objectives: f64 = solved
        .models()
        .iter()
        .map(|model| model.objective_value().unwrap())
        .sum();
    assert!((solved.objective_value() - window_objectives).abs() < 1e-9);
}

#[test]
fn test_segments_tiling_the_horizon() {
    let mut system = reference_system(time_axis(), false);
    let parameters = SegmentedParameters {
        segment_length: 3,
        nr_of_used_steps: 3,
    };
    let solved = Calculation::new("tiled", &mut system, None)
        .unwrap()
        .run_segmented(&SolverSettings::default(), &parameters)
        .unwrap();
    let tree = &solved.results().tree;
    let n = HEAT_LOAD.len();

    assert_eq!(solved.models().len(), 3);
    let segmented = solved.infos().segmented.as_ref().unwrap();
    assert_eq!(segmented.windows.len(), 3);

    let charge_state = values(tree, &["Speicher", "charge_state"]);
    let charging = values(tree, &["Speicher", "Q_th_load", "val"]);
    let discharging = values(tree, &["Speicher", "Q_th_unload", "val"]);
    assert_eq!(charge_state.len(), n + 1);
    assert_eq!(charging.len(), n);
    assert_all_close(&values(tree, &["Waermelast", "Q_th_Last", "val"]), &HEAT_LOAD);

    // Each window picks up the charge state exactly where the previous one ended
    for (model, edge) in [(1, 3), (2, 6)] {
        let before_values = solved.models()[model].before_values().unwrap();
        let start = before_values.get("Speicher__charge_state").unwrap();
        assert!((start - charge_state[edge]).abs() < 1e-6);

        for t in [edge - 1, edge] {
            let expected = charge_state[t] * (1.0 - 0.08) + charging[t] * 0.9 - discharging[t];
            assert!(
                (charge_state[t + 1] - expected).abs() < 1e-5,
                "Charge state at step {t} is not continuous"
            );
        }
    }

    // Windows without look-ahead cannot beat the full optimum
    assert!(total_costs(tree) >= EXPECTED_COSTS * (1.0 - 1e-4));
}

#[test]
fn test_segmented_with_investment() {
    let mut system = reference_system(time_axis(), true);
    let parameters = SegmentedParameters {
        segment_length: 4,
        nr_of_used_steps: 2,
    };
    let error = Calculation::new("invest", &mut system, None)
        .unwrap()
        .run_segmented(&SolverSettings::default(), &parameters)
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Segmented calculations cannot be used with investment decisions (elements: Speicher)"
    );
}
