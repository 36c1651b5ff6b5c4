//! Fixtures for tests
use crate::math_model::solver::SolverSettings;
use crate::time::TimeAxis;
use chrono::{NaiveDate, NaiveDateTime};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Midnight on 1 January 2020
pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Nine hourly steps starting at midnight on 1 January 2020
#[fixture]
pub fn time_axis() -> TimeAxis {
    TimeAxis::regular(start_time(), 9, 1.0).unwrap()
}

/// Default solver settings without console output
#[fixture]
pub fn quiet_solver_settings() -> SolverSettings {
    SolverSettings {
        threads: Some(1),
        ..SolverSettings::default()
    }
}
