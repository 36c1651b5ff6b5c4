//! Code for loading program settings.
use crate::get_flowopt_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use crate::math_model::solver::SolverSettings;
use anyhow::{Context, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# This file contains the program settings for flowopt.
# Uncomment a line to change the corresponding setting.
";

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_flowopt_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// The default solver settings
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            solver: SolverSettings::default(),
        }
    }
}

impl Settings {
    /// Read the program settings file.
    ///
    /// If the file is not present, default values for settings will be used
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    /// Read from the specified path, using defaults if the file doesn't exist
    pub fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        settings
            .solver
            .validate()
            .with_context(|| format!("Invalid solver settings in {}", file_path.display()))?;

        Ok(settings)
    }

    /// Documentation for a field of the table with the given name
    fn field_docs(table: Option<&str>, field: &str) -> Option<&'static str> {
        match table {
            None => Settings::get_field_docs(field).ok(),
            Some("solver") => SolverSettings::get_field_docs(field).ok(),
            Some(_) => None,
        }
    }

    /// The contents of the default settings file
    pub fn default_file_contents() -> String {
        // Settings object with default values set by serde
        let settings: Settings =
            toml::from_str("").expect("Cannot create settings from empty TOML file");

        // Convert to TOML
        let settings_raw = toml::to_string(&settings).expect("Could not convert settings to TOML");

        // Iterate through the generated TOML, commenting out lines and adding docs
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        let mut table = None;
        for line in settings_raw.split('\n') {
            let line = line.trim();
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if let Some(docs) = Self::field_docs(None, name) {
                    write!(&mut out, "\n# # {}", docs.trim()).unwrap();
                }
                write!(&mut out, "\n# {line}\n").unwrap();
                table = Some(name.to_string());
            } else if let Some(last) = line.find('=') {
                let field = line[..last].trim();
                if let Some(docs) = Self::field_docs(table.as_deref(), field) {
                    for line in docs.split('\n') {
                        write!(&mut out, "\n# # {}\n", line.trim()).unwrap();
                    }
                }

                writeln!(&mut out, "# {line}").unwrap();
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_model::solver::SolverName;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_settings_load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn test_settings_load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_level = \"warn\"\n\n[solver]\nsolver_name = \"gurobi\"").unwrap();
        }

        let settings = Settings::load_from_path(&file_path).unwrap();
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.solver.solver_name, SolverName::Gurobi);
        assert_eq!(settings.solver.time_limit_seconds, 3600);
    }

    #[test]
    fn test_settings_load_from_path_invalid_solver() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "[solver]\nmip_gap = -1.0").unwrap();
        }

        let err = Settings::load_from_path(&file_path).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid solver settings in {}", file_path.display())
        );
    }

    #[test]
    fn test_default_file_contents() {
        let contents = Settings::default_file_contents();
        assert!(contents.contains("# log_level = \"info\""));
        assert!(contents.contains("# [solver]"));
        assert!(contents.contains("# # Relative MIP gap at which the solver stops"));
        // Whether to overwrite saved documents is up to each caller of `save`
        assert!(!contents.contains("overwrite"));

        // Uncommenting every setting gives the defaults again
        let uncommented: String = contents
            .strip_prefix(DEFAULT_SETTINGS_FILE_HEADER)
            .unwrap()
            .lines()
            .filter(|line| !line.starts_with("# #"))
            .map(|line| line.strip_prefix("# ").unwrap_or(line))
            .filter(|line| !line.starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n");
        let settings: Settings = toml::from_str(&uncommented).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
