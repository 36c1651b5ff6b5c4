//! The command line interface for flowopt.
use crate::calculation::results::{ResultNode, ResultTree};
use crate::log;
use crate::math_model::solver::SolverName;
use crate::output::{load_infos, load_results};
use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for flowopt.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Manage the program settings file.
    Settings {
        /// The available subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
    /// Print the native options the configured solver would receive.
    SolverOptions {
        /// Use this solver instead of the one in the settings file.
        #[arg(long)]
        solver: Option<SolverName>,
    },
    /// Print a summary of a saved calculation.
    Show {
        /// The directory the calculation was saved to.
        output_dir: PathBuf,
        /// The name of the calculation.
        name: String,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Settings { subcommand } => subcommand.execute(),
            Self::SolverOptions { solver } => handle_solver_options_command(solver, None),
            Self::Show { output_dir, name } => handle_show_command(&output_dir, &name, None),
        }
    }
}

/// Parse CLI arguments and run the selected command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ flowopt --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // Output program help
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn settings_or_load(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Handle the `solver-options` command.
pub fn handle_solver_options_command(
    solver: Option<SolverName>,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = settings_or_load(settings)?;
    if let Some(solver) = solver {
        settings.solver.solver_name = solver;
    }
    settings.solver.validate()?;

    print!("{}", describe_solver_options(&settings));

    Ok(())
}

/// The native options of the configured solver, one `name = value` line each
fn describe_solver_options(settings: &Settings) -> String {
    let mut out = format!("# Options for {}\n", settings.solver.solver_name);
    for (name, value) in settings.solver.native_options() {
        writeln!(&mut out, "{name} = {value}").unwrap();
    }

    out
}

/// Handle the `show` command.
pub fn handle_show_command(
    output_dir: &Path,
    name: &str,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = settings_or_load(settings)?;

    // Initialise program logger (no log files are written for this command)
    log::init(Some(&settings.log_level), None).context("Failed to initialise logging.")?;

    let summary = summarise_calculation(output_dir, name)
        .with_context(|| format!("Failed to load calculation {name}."))?;
    print!("{summary}");

    Ok(())
}

/// Describe a saved calculation in human-readable form
fn summarise_calculation(output_dir: &Path, name: &str) -> Result<String> {
    let infos = load_infos(output_dir, name)?;
    let results = load_results(output_dir, name)?;
    ::log::info!("Loaded calculation {name} from {}", output_dir.display());

    let calculation = &infos.calculation;
    let mut out = String::new();
    writeln!(&mut out, "Calculation: {}", calculation.name)?;
    writeln!(&mut out, "Mode: {}", calculation.mode)?;
    writeln!(
        &mut out,
        "Time steps: {} ({} h)",
        calculation.nr_of_time_indices, results.time.dt_in_hours_total
    )?;
    writeln!(
        &mut out,
        "Duration: {:.2} s (modeling {:.2} s, solving {:.2} s)",
        calculation.durations.total,
        calculation.durations.modeling,
        calculation.durations.solving
    )?;
    let objective: f64 = infos
        .system_models
        .iter()
        .filter_map(|model| model.objective_value)
        .sum();
    writeln!(
        &mut out,
        "Models: {} (total objective {objective})",
        infos.system_models.len()
    )?;
    if let Some(segmented) = &infos.segmented {
        writeln!(
            &mut out,
            "Segments: {} of {} steps, {} used",
            segmented.windows.len(),
            segmented.parameters.segment_length,
            segmented.parameters.nr_of_used_steps
        )?;
    }
    if let Some(aggregated) = &infos.aggregated {
        writeln!(
            &mut out,
            "Typical periods: {} of {} h, order {:?}",
            aggregated.parameters.nr_of_typical_periods,
            aggregated.parameters.hours_per_period,
            aggregated.periods_order
        )?;
    }
    writeln!(&mut out, "Results:")?;
    describe_tree(&results.tree, 1, &mut out)?;

    Ok(out)
}

/// Append an indented outline of a result tree
fn describe_tree(tree: &ResultTree, depth: usize, out: &mut String) -> Result<()> {
    let indent = "  ".repeat(depth);
    for (key, node) in tree.iter() {
        match node {
            ResultNode::Branch(branch) => {
                writeln!(out, "{indent}{key}")?;
                describe_tree(branch, depth + 1, out)?;
            }
            ResultNode::Leaf(leaf) => writeln!(
                out,
                "{indent}{key}: {} values, min {}, max {}",
                leaf.value.len(),
                leaf.value.min(),
                leaf.value.max()
            )?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_describe_solver_options() {
        let mut settings = Settings::default();
        settings.solver.solver_name = SolverName::Cbc;
        settings.solver.mip_gap = 0.01;
        assert_eq!(
            describe_solver_options(&settings),
            "# Options for cbc\nratio = 0.01\nsec = 3600\n"
        );
    }
}
