//! Writing the results of calculations to disk and reading them back.
//!
//! A calculation named `name` is stored as three files:
//!
//! * `<name>_info.toml`: information about the calculation and its models, plus metadata
//! * `<name>_results.csv`: one row per value, keyed by the slash-joined path of labels
//! * `<name>_time.csv`: the time steps the results refer to
use crate::calculation::CalculationInfos;
use crate::calculation::results::{CalculationResults, ResultLeaf, ResultNode, ResultTree};
use crate::input::{read_csv, read_toml};
use crate::numeric::Numeric;
use crate::time::TimeData;
use anyhow::{Context, Result, bail, ensure};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;
use metadata::Metadata;

/// Separator of the labels in a result path
const PATH_SEPARATOR: char = '/';

/// Format of timestamps in the time file
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Path of the info document of a calculation
pub fn info_file_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{name}_info.toml"))
}

/// Path of the results document of a calculation
pub fn results_file_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{name}_results.csv"))
}

/// Path of the time document of a calculation
pub fn time_file_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{name}_time.csv"))
}

/// Create an output directory, including its parents, if it doesn't exist yet
pub fn create_output_directory(output_dir: &Path) -> Result<()> {
    if output_dir.is_dir() {
        // already exists
        return Ok(());
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))
}

/// What a row of the results document holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EntryKind {
    /// A single value
    Scalar,
    /// One entry of a vector (an empty vector has a single row without index)
    Vector,
    /// An empty branch
    Branch,
}

/// A row of the results document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ResultRow {
    path: String,
    kind: EntryKind,
    boundary_inclusive: bool,
    index: Option<usize>,
    value: Option<f64>,
}

/// A row of the time document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TimeRow {
    time: String,
    dt_in_hours: Option<f64>,
}

/// Convert a tree into rows of the results document, depth first
fn result_rows(tree: &ResultTree, prefix: &str, rows: &mut Vec<ResultRow>) {
    for (key, node) in tree.iter() {
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}{PATH_SEPARATOR}{key}")
        };
        match node {
            ResultNode::Branch(branch) if branch.is_empty() => rows.push(ResultRow {
                path,
                kind: EntryKind::Branch,
                boundary_inclusive: false,
                index: None,
                value: None,
            }),
            ResultNode::Branch(branch) => result_rows(branch, &path, rows),
            ResultNode::Leaf(ResultLeaf {
                value: Numeric::Scalar(value),
                boundary_inclusive,
            }) => rows.push(ResultRow {
                path,
                kind: EntryKind::Scalar,
                boundary_inclusive: *boundary_inclusive,
                index: None,
                value: Some(*value),
            }),
            ResultNode::Leaf(ResultLeaf {
                value: Numeric::Vector(values),
                boundary_inclusive,
            }) if values.is_empty() => rows.push(ResultRow {
                path,
                kind: EntryKind::Vector,
                boundary_inclusive: *boundary_inclusive,
                index: None,
                value: None,
            }),
            ResultNode::Leaf(ResultLeaf {
                value: Numeric::Vector(values),
                boundary_inclusive,
            }) => rows.extend(values.iter().enumerate().map(|(index, value)| ResultRow {
                path: path.clone(),
                kind: EntryKind::Vector,
                boundary_inclusive: *boundary_inclusive,
                index: Some(index),
                value: Some(*value),
            })),
        }
    }
}

/// Rebuild a tree from the rows of a results document
fn tree_from_rows(rows: Vec<ResultRow>) -> Result<ResultTree> {
    // Rows of the same path follow each other, so group them preserving their order
    let mut entries: IndexMap<String, (EntryKind, bool, Vec<ResultRow>)> = IndexMap::new();
    for row in rows {
        let entry = entries
            .entry(row.path.clone())
            .or_insert_with(|| (row.kind, row.boundary_inclusive, Vec::new()));
        ensure!(
            entry.0 == row.kind && entry.1 == row.boundary_inclusive,
            "Rows of result entry {} disagree on their kind",
            row.path
        );
        entry.2.push(row);
    }

    let mut tree = ResultTree::new();
    for (path, (kind, boundary_inclusive, rows)) in entries {
        let node = match kind {
            EntryKind::Branch => ResultNode::Branch(ResultTree::new()),
            EntryKind::Scalar => {
                let [row] = rows.as_slice() else {
                    bail!("Result entry {path} must have a single value");
                };
                let value = row
                    .value
                    .with_context(|| format!("Result entry {path} has no value"))?;
                ResultNode::Leaf(ResultLeaf {
                    value: Numeric::Scalar(value),
                    boundary_inclusive,
                })
            }
            EntryKind::Vector => {
                let mut values = Vec::with_capacity(rows.len());
                if !(rows.len() == 1 && rows[0].index.is_none()) {
                    for (expected, row) in rows.iter().enumerate() {
                        ensure!(
                            row.index == Some(expected),
                            "Expected index {expected} for result entry {path}, found {:?}",
                            row.index
                        );
                        values.push(row.value.with_context(|| {
                            format!("Result entry {path} has no value at index {expected}")
                        })?);
                    }
                }
                ResultNode::Leaf(ResultLeaf {
                    value: Numeric::Vector(values),
                    boundary_inclusive,
                })
            }
        };
        let keys = path
            .split(PATH_SEPARATOR)
            .map(ToString::to_string)
            .collect_vec();
        tree.insert_at_path(&keys, node)?;
    }

    Ok(tree)
}

/// Convert time data into rows of the time document
fn time_rows(time: &TimeData) -> Vec<TimeRow> {
    time.time_series_with_end
        .iter()
        .enumerate()
        .map(|(i, timestamp)| TimeRow {
            time: timestamp.format(TIMESTAMP_FORMAT).to_string(),
            dt_in_hours: time.dt_in_hours.get(i).copied(),
        })
        .collect()
}

/// Rebuild time data from the rows of a time document
fn time_from_rows(rows: Vec<TimeRow>) -> Result<TimeData> {
    let Some((last, steps)) = rows.split_last() else {
        bail!("The time document has no rows");
    };
    ensure!(!steps.is_empty(), "The time document has no time steps");
    ensure!(
        last.dt_in_hours.is_none(),
        "The last row of the time document must not have a duration"
    );

    let time_series_with_end: Vec<NaiveDateTime> = rows
        .iter()
        .map(|row| {
            NaiveDateTime::parse_from_str(&row.time, TIMESTAMP_FORMAT)
                .with_context(|| format!("Invalid timestamp {}", row.time))
        })
        .try_collect()?;
    let dt_in_hours: Vec<f64> = steps
        .iter()
        .map(|row| {
            row.dt_in_hours
                .with_context(|| format!("Time step {} has no duration", row.time))
        })
        .try_collect()?;
    let time_series = time_series_with_end[..steps.len()].to_vec();
    let dt_in_hours_total = dt_in_hours.iter().sum();

    Ok(TimeData {
        time_series,
        time_series_with_end,
        dt_in_hours,
        dt_in_hours_total,
    })
}

/// Write rows to a CSV file
fn write_csv<T: Serialize>(file_path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create file {}", file_path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the documents of a calculation.
///
/// # Arguments
///
/// * `output_dir` - Directory to write to; created if it doesn't exist
/// * `name` - Name of the calculation, used as prefix of the file names
/// * `infos` - Information about the calculation
/// * `results` - The results of the calculation
/// * `overwrite` - Whether existing files may be replaced
pub fn save_calculation(
    output_dir: &Path,
    name: &str,
    infos: &CalculationInfos,
    results: &CalculationResults,
    overwrite: bool,
) -> Result<()> {
    create_output_directory(output_dir)?;
    let info_path = info_file_path(output_dir, name);
    let results_path = results_file_path(output_dir, name);
    let time_path = time_file_path(output_dir, name);
    if !overwrite {
        for path in [&info_path, &results_path, &time_path] {
            ensure!(
                !path.exists(),
                "Output file {} already exists. Enable overwriting to replace it.",
                path.display()
            );
        }
    }

    let toml::Value::Table(mut document) = toml::Value::try_from(infos)? else {
        bail!("Calculation infos must be a table");
    };
    document.insert(
        "metadata".into(),
        toml::Value::try_from(Metadata::collect()?)?,
    );
    fs::write(&info_path, toml::to_string(&document)?)
        .with_context(|| format!("Could not write file {}", info_path.display()))?;

    let mut rows = Vec::new();
    result_rows(&results.tree, "", &mut rows);
    write_csv(&results_path, &rows)?;
    write_csv(&time_path, &time_rows(&results.time))?;
    log::info!("Saved calculation {name} to {}", output_dir.display());

    Ok(())
}

/// Read the info document of a calculation
pub fn load_infos(output_dir: &Path, name: &str) -> Result<CalculationInfos> {
    read_toml(&info_file_path(output_dir, name))
}

/// Read the metadata stored in the info document of a calculation
pub fn load_metadata(output_dir: &Path, name: &str) -> Result<Metadata> {
    #[derive(Deserialize)]
    struct Document {
        metadata: Metadata,
    }

    let document: Document = read_toml(&info_file_path(output_dir, name))?;
    Ok(document.metadata)
}

/// Read the results and time documents of a calculation
pub fn load_results(output_dir: &Path, name: &str) -> Result<CalculationResults> {
    let results_path = results_file_path(output_dir, name);
    let tree = tree_from_rows(read_csv(&results_path)?)
        .with_context(|| format!("Invalid results file {}", results_path.display()))?;
    let time_path = time_file_path(output_dir, name);
    let time = time_from_rows(read_csv(&time_path)?)
        .with_context(|| format!("Invalid time file {}", time_path.display()))?;

    Ok(CalculationResults { tree, time })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::{CalculationDurations, CalculationMode, CalculationSummary};
    use crate::fixture::{assert_error, time_axis};
    use crate::time::TimeAxis;
    use rstest::{fixture, rstest};
    use tempfile::tempdir;

    #[fixture]
    fn results(time_axis: TimeAxis) -> CalculationResults {
        let mut storage = ResultTree::new();
        storage
            .insert_leaf(
                "charge_state",
                ResultLeaf {
                    value: vec![0.0, 1.5, 3.0, 2.5].into(),
                    boundary_inclusive: true,
                },
            )
            .unwrap();
        storage
            .insert_leaf(
                "capacity",
                ResultLeaf {
                    value: Numeric::Scalar(30.0),
                    boundary_inclusive: false,
                },
            )
            .unwrap();
        let mut tree = ResultTree::new();
        tree.insert_branch("storage", storage).unwrap();
        tree.insert_branch("bus", ResultTree::new()).unwrap();
        tree.insert_leaf(
            "empty",
            ResultLeaf {
                value: Numeric::Vector(Vec::new()),
                boundary_inclusive: false,
            },
        )
        .unwrap();

        CalculationResults {
            tree,
            time: time_axis.time_data(&[0, 1, 2]).unwrap(),
        }
    }

    #[fixture]
    fn infos() -> CalculationInfos {
        CalculationInfos {
            calculation: CalculationSummary {
                name: "test".into(),
                mode: CalculationMode::Full,
                nr_of_time_indices: 3,
                durations: CalculationDurations::default(),
            },
            segmented: None,
            aggregated: None,
            system_models: Vec::new(),
        }
    }

    #[rstest]
    fn test_result_rows(results: CalculationResults) {
        let mut rows = Vec::new();
        result_rows(&results.tree, "", &mut rows);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].path, "storage/charge_state");
        assert_eq!(rows[3].index, Some(3));
        assert_eq!(rows[4].kind, EntryKind::Scalar);
        assert_eq!(rows[5].kind, EntryKind::Branch);
        assert_eq!(rows[6].value, None);
    }

    #[rstest]
    fn test_save_and_load(results: CalculationResults, infos: CalculationInfos) {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("out");
        save_calculation(&output_dir, "test", &infos, &results, false).unwrap();

        assert_eq!(load_infos(&output_dir, "test").unwrap(), infos);
        assert_eq!(load_results(&output_dir, "test").unwrap(), results);
        let metadata = load_metadata(&output_dir, "test").unwrap();
        assert_eq!(metadata.program.name, "flowopt");
    }

    #[rstest]
    fn test_save_no_overwrite(results: CalculationResults, infos: CalculationInfos) {
        let dir = tempdir().unwrap();
        save_calculation(dir.path(), "test", &infos, &results, false).unwrap();
        save_calculation(dir.path(), "test", &infos, &results, true).unwrap();
        let info_path = info_file_path(dir.path(), "test");
        assert_error!(
            save_calculation(dir.path(), "test", &infos, &results, false),
            format!(
                "Output file {} already exists. Enable overwriting to replace it.",
                info_path.display()
            )
        );
    }

    #[test]
    fn test_tree_from_rows_bad_index() {
        let rows = vec![ResultRow {
            path: "a/b".into(),
            kind: EntryKind::Vector,
            boundary_inclusive: false,
            index: Some(1),
            value: Some(1.0),
        }];
        assert_error!(
            tree_from_rows(rows),
            "Expected index 0 for result entry a/b, found Some(1)"
        );
    }

    #[test]
    fn test_time_from_rows_missing_end() {
        let rows = vec![TimeRow {
            time: "2020-01-01 00:00:00".into(),
            dt_in_hours: Some(1.0),
        }];
        assert_error!(
            time_from_rows(rows),
            "The time document has no time steps"
        );
    }
}
