//! Solver selection and the mapping of generic solver settings onto native solver options.
use super::backend::Backend;
use super::highs::HighsBackend;
use anyhow::{Result, bail, ensure};
use documented::DocumentedFields;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString};

/// Options in the vocabulary of a particular solver, in the order they are applied
pub type NativeOptions = IndexMap<String, OptionValue>;

/// The supported solvers
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SolverName {
    /// HiGHS
    #[default]
    Highs,
    /// Gurobi
    Gurobi,
    /// CPLEX
    Cplex,
    /// GLPK
    Glpk,
    /// COIN-OR CBC
    Cbc,
}

/// The value of a native solver option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// An on/off switch
    Bool(bool),
    /// An integer
    Int(i64),
    /// A floating-point number
    Float(f64),
    /// A string
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "\"{value}\""),
        }
    }
}

fn default_mip_gap() -> f64 {
    0.0001
}

fn default_time_limit_seconds() -> u64 {
    3600
}

/// Settings for solving a model
#[derive(Debug, Clone, PartialEq, DocumentedFields, Serialize, Deserialize)]
pub struct SolverSettings {
    /// The solver to use (highs, gurobi, cplex, glpk or cbc)
    #[serde(default)]
    pub solver_name: SolverName,
    /// Relative MIP gap at which the solver stops
    #[serde(default = "default_mip_gap")]
    pub mip_gap: f64,
    /// Time limit for a single solve in seconds
    #[serde(default = "default_time_limit_seconds")]
    pub time_limit_seconds: u64,
    /// Whether to show the solver's own output on the console
    #[serde(default)]
    pub solver_output_to_console: bool,
    /// Number of threads the solver may use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    /// File for the solver's log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logfile_name: Option<PathBuf>,
    /// Additional native options, passed on as they are
    #[serde(default)]
    pub extra: IndexMap<String, OptionValue>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            solver_name: SolverName::default(),
            mip_gap: default_mip_gap(),
            time_limit_seconds: default_time_limit_seconds(),
            solver_output_to_console: false,
            threads: None,
            logfile_name: None,
            extra: IndexMap::new(),
        }
    }
}

impl SolverSettings {
    /// Check that the settings are usable
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.mip_gap.is_finite() && self.mip_gap >= 0.0,
            "MIP gap must be a non-negative number, but is {}",
            self.mip_gap
        );
        ensure!(
            self.time_limit_seconds > 0,
            "Time limit must be at least one second"
        );
        ensure!(self.threads != Some(0), "Number of threads must be positive");

        Ok(())
    }

    /// The native options the selected solver receives.
    ///
    /// | solver | MIP gap       | time limit   | threads   |
    /// |--------|---------------|--------------|-----------|
    /// | highs  | `mip_rel_gap` | `time_limit` | `threads` |
    /// | gurobi | `mipgap`      | `TimeLimit`  | `Threads` |
    /// | cplex  | `mipgap`      | `timelimit`  | `threads` |
    /// | glpk   | `mipgap`      |              |           |
    /// | cbc    | `ratio`       | `sec`        | `threads` |
    ///
    /// HiGHS also gets its console and log file options and has presolve and parallelism turned
    /// on. Its output is enabled whenever it goes to the console or to a log file. Extra options
    /// are applied last and replace mapped options of the same name.
    pub fn native_options(&self) -> NativeOptions {
        let mut options = NativeOptions::new();
        let time_limit = i64::try_from(self.time_limit_seconds).unwrap_or(i64::MAX);
        let threads = self.threads.map(i64::from);

        let mut insert = |name: &str, value: OptionValue| {
            options.insert(name.to_string(), value);
        };
        match self.solver_name {
            SolverName::Highs => {
                insert("mip_rel_gap", self.mip_gap.into());
                insert("time_limit", (self.time_limit_seconds as f64).into());
                if let Some(threads) = threads {
                    insert("threads", threads.into());
                }
                let output = self.solver_output_to_console || self.logfile_name.is_some();
                insert("output_flag", output.into());
                insert("log_to_console", self.solver_output_to_console.into());
                if let Some(path) = &self.logfile_name {
                    insert("log_file", OptionValue::Text(path.to_string_lossy().into_owned()));
                }
                insert("presolve", "on".into());
                insert("parallel", "on".into());
            }
            SolverName::Gurobi => {
                insert("mipgap", self.mip_gap.into());
                insert("TimeLimit", time_limit.into());
                if let Some(threads) = threads {
                    insert("Threads", threads.into());
                }
            }
            SolverName::Cplex => {
                insert("mipgap", self.mip_gap.into());
                insert("timelimit", time_limit.into());
                if let Some(threads) = threads {
                    insert("threads", threads.into());
                }
            }
            SolverName::Glpk => {
                insert("mipgap", self.mip_gap.into());
            }
            SolverName::Cbc => {
                insert("ratio", self.mip_gap.into());
                insert("sec", time_limit.into());
                if let Some(threads) = threads {
                    insert("threads", threads.into());
                }
            }
        }

        for (name, value) in &self.extra {
            insert(name, value.clone());
        }

        options
    }

    /// Create a new backend for the selected solver
    pub fn create_backend(&self) -> Result<Box<dyn Backend>> {
        match self.solver_name {
            SolverName::Highs => Ok(Box::new(HighsBackend::default())),
            other => bail!("No backend is available for solver {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;
    use std::str::FromStr;

    fn settings(solver_name: SolverName) -> SolverSettings {
        SolverSettings {
            solver_name,
            mip_gap: 0.01,
            time_limit_seconds: 60,
            threads: Some(2),
            ..SolverSettings::default()
        }
    }

    #[rstest]
    #[case(SolverName::Highs, &["mip_rel_gap", "time_limit", "threads", "output_flag", "log_to_console", "presolve", "parallel"])]
    #[case(SolverName::Gurobi, &["mipgap", "TimeLimit", "Threads"])]
    #[case(SolverName::Cplex, &["mipgap", "timelimit", "threads"])]
    #[case(SolverName::Glpk, &["mipgap"])]
    #[case(SolverName::Cbc, &["ratio", "sec", "threads"])]
    fn test_native_option_names(#[case] solver_name: SolverName, #[case] expected: &[&str]) {
        let options = settings(solver_name).native_options();
        let names: Vec<_> = options.keys().map(String::as_str).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_native_option_values_highs() {
        let mut settings = settings(SolverName::Highs);
        settings.logfile_name = Some("results/solver.log".into());
        let options = settings.native_options();
        assert_eq!(options["mip_rel_gap"], OptionValue::Float(0.01));
        assert_eq!(options["time_limit"], OptionValue::Float(60.0));
        assert_eq!(options["threads"], OptionValue::Int(2));
        assert_eq!(options["output_flag"], OptionValue::Bool(true));
        assert_eq!(options["log_to_console"], OptionValue::Bool(false));
        assert_eq!(
            options["log_file"],
            OptionValue::Text("results/solver.log".into())
        );
    }

    #[rstest]
    #[case(false, None, false, false)]
    #[case(true, None, true, true)]
    #[case(false, Some("solver.log"), true, false)]
    #[case(true, Some("solver.log"), true, true)]
    fn test_highs_output_options(
        #[case] to_console: bool,
        #[case] logfile_name: Option<&str>,
        #[case] output_flag: bool,
        #[case] log_to_console: bool,
    ) {
        let settings = SolverSettings {
            solver_output_to_console: to_console,
            logfile_name: logfile_name.map(Into::into),
            ..settings(SolverName::Highs)
        };
        let options = settings.native_options();
        assert_eq!(options["output_flag"], OptionValue::Bool(output_flag));
        assert_eq!(options["log_to_console"], OptionValue::Bool(log_to_console));
        assert_eq!(options.contains_key("log_file"), logfile_name.is_some());
    }

    #[test]
    fn test_native_option_values_cbc() {
        let options = settings(SolverName::Cbc).native_options();
        assert_eq!(options["ratio"], OptionValue::Float(0.01));
        assert_eq!(options["sec"], OptionValue::Int(60));
    }

    #[test]
    fn test_extra_options_override() {
        let mut settings = settings(SolverName::Highs);
        settings.extra.insert("presolve".into(), "off".into());
        settings
            .extra
            .insert("random_seed".into(), OptionValue::Int(3));
        let options = settings.native_options();
        assert_eq!(options["presolve"], OptionValue::Text("off".into()));
        assert_eq!(options.last(), Some((&"random_seed".to_string(), &OptionValue::Int(3))));
    }

    #[test]
    fn test_solver_name_parse() {
        assert_eq!(SolverName::from_str("gurobi").unwrap(), SolverName::Gurobi);
        assert!(SolverName::from_str("xpress").is_err());
        assert_eq!(SolverName::Cplex.to_string(), "cplex");
    }

    #[test]
    fn test_solver_settings_from_toml() {
        let settings: SolverSettings = toml::from_str(
            "solver_name = \"cbc\"\nmip_gap = 0.05\n\n[extra]\nseed = 4\nmethod = \"dual\"\n",
        )
        .unwrap();
        assert_eq!(settings.solver_name, SolverName::Cbc);
        assert_eq!(settings.time_limit_seconds, 3600);
        assert_eq!(settings.extra["seed"], OptionValue::Int(4));
        assert_eq!(settings.extra["method"], OptionValue::Text("dual".into()));

        assert!(toml::from_str::<SolverSettings>("solver_name = \"xpress\"").is_err());
    }

    #[test]
    fn test_create_backend() {
        assert!(settings(SolverName::Highs).create_backend().is_ok());
        assert_error!(
            settings(SolverName::Gurobi).create_backend(),
            "No backend is available for solver gurobi"
        );
    }

    #[test]
    fn test_validate() {
        let mut settings = settings(SolverName::Highs);
        assert!(settings.validate().is_ok());
        settings.mip_gap = -0.1;
        assert_error!(
            settings.validate(),
            "MIP gap must be a non-negative number, but is -0.1"
        );
    }
}
