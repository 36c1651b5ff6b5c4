//! Build, solve and combine time-indexed optimisation models of energy systems.
//!
//! Elements of an [`system::EnergySystem`] contribute variables and equations to a
//! [`system_model::SystemModel`], which is translated to a solver backend and solved. A
//! [`calculation::Calculation`] does this for all time steps at once, in overlapping windows or on
//! time series represented by typical periods.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod aggregation;
pub mod calculation;
pub mod cli;
pub mod element;
pub mod input;
pub mod log;
pub mod math_model;
pub mod numeric;
pub mod output;
pub mod settings;
pub mod system;
pub mod system_model;
pub mod time;

#[cfg(test)]
mod fixture;

/// Get the config dir for the program
pub fn get_flowopt_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config dir on this platform; fall back to the current directory
        return PathBuf::from(".");
    };
    config_dir.push("flowopt");

    config_dir
}
