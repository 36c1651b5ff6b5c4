//! The generic equation layer: variables, equations and the model which hands them to a solver.
//!
//! A [`MathModel`] owns every variable and equation of one solve. Variables and equations are
//! referred to by the IDs the model hands out when they are added. Solving translates the model
//! into a fresh [`Backend`], runs the solver and keeps the backend so that the values of the
//! variables can be retrieved afterwards.
use crate::numeric::Numeric;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

pub mod backend;
pub mod equation;
pub mod highs;
pub mod solver;
pub mod summand;
pub mod variable;
use backend::Backend;
use equation::{Equation, EquationId, EquationKind};
use solver::{SolverName, SolverSettings};
use variable::{ResultValue, Variable, VariableId, VariableSpec};

/// Time spent on the stages of a solve
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelDurations {
    /// Translating the model into the backend
    pub to_math_model: Duration,
    /// Running the solver
    pub solve: Duration,
}

/// A mathematical model for a single solver invocation
#[derive(Debug)]
pub struct MathModel {
    label: String,
    variables: Vec<Variable>,
    equations: Vec<Equation>,
    labels: HashSet<String>,
    objective: Option<EquationId>,
    backend: Option<Box<dyn Backend>>,
    solver_name: Option<SolverName>,
    objective_value: Option<f64>,
    durations: ModelDurations,
}

impl MathModel {
    /// Create an empty model
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            variables: Vec::new(),
            equations: Vec::new(),
            labels: HashSet::new(),
            objective: None,
            backend: None,
            solver_name: None,
            objective_value: None,
            durations: ModelDurations::default(),
        }
    }

    /// The model's label
    pub fn label(&self) -> &str {
        &self.label
    }

    fn register_label(&mut self, label: &str) -> Result<()> {
        ensure!(
            self.labels.insert(label.to_string()),
            "Label {label} is already used in model {}",
            self.label
        );

        Ok(())
    }

    /// Add a variable to the model
    pub fn add_variable(&mut self, spec: VariableSpec) -> Result<VariableId> {
        let id = VariableId(self.variables.len());
        let variable = spec.build(id)?;
        self.register_label(variable.label())?;
        self.variables.push(variable);

        Ok(id)
    }

    /// Add an empty equation, inequality or objective to the model.
    ///
    /// A model has at most one objective.
    pub fn add_equation(&mut self, label: impl Into<String>, kind: EquationKind) -> Result<EquationId> {
        let label = label.into();
        if kind == EquationKind::Objective {
            ensure!(
                self.objective.is_none(),
                "Model {} already has an objective",
                self.label
            );
        }
        self.register_label(&label)?;

        let id = EquationId(self.equations.len());
        self.equations.push(Equation::new(id, label, kind));
        if kind == EquationKind::Objective {
            self.objective = Some(id);
        }

        Ok(id)
    }

    /// Add a summand to an equation.
    ///
    /// See [`Equation::add_summand`].
    pub fn add_summand(
        &mut self,
        equation: EquationId,
        variable: VariableId,
        factor: impl Into<Numeric>,
        indices: Option<Vec<usize>>,
        as_sum: bool,
    ) -> Result<()> {
        let variable = &self.variables[variable.0];
        let equation = &mut self.equations[equation.0];
        equation
            .add_summand(variable, factor, indices, as_sum)
            .with_context(|| format!("Invalid summand in equation {}", equation.label()))
    }

    /// Add to the right-hand side of an equation
    pub fn add_constant(&mut self, equation: EquationId, value: impl Into<Numeric>) -> Result<()> {
        let equation = &mut self.equations[equation.0];
        equation
            .add_constant(value)
            .with_context(|| format!("Invalid constant in equation {}", equation.label()))
    }

    /// Get a variable
    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0]
    }

    /// Find a variable by its label
    pub fn variable_by_label(&self, label: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.label() == label)
    }

    /// All variables in the order they were added
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    /// Get an equation
    pub fn equation(&self, id: EquationId) -> &Equation {
        &self.equations[id.0]
    }

    /// Find an equation by its label
    pub fn equation_by_label(&self, label: &str) -> Option<&Equation> {
        self.equations.iter().find(|equation| equation.label() == label)
    }

    /// The objective, if one has been added
    pub fn objective(&self) -> Option<&Equation> {
        self.objective.map(|id| self.equation(id))
    }

    fn equations_of_kind(&self, kind: EquationKind) -> impl Iterator<Item = &Equation> {
        self.equations
            .iter()
            .filter(move |equation| equation.kind() == kind)
    }

    /// Register the whole model with a backend.
    ///
    /// Variables are registered first, then equalities, inequalities and finally the objective.
    pub fn to_math_model(&mut self, backend: &mut dyn Backend) -> Result<()> {
        let start = Instant::now();
        for variable in &self.variables {
            backend.register_variable(&format!("var__{}", variable.label()), variable)?;
        }
        for equation in self.equations_of_kind(EquationKind::Equality) {
            backend.register_equation(&format!("eq__{}", equation.label()), equation)?;
        }
        for equation in self.equations_of_kind(EquationKind::Inequality) {
            backend.register_equation(&format!("ineq__{}", equation.label()), equation)?;
        }
        if let Some(objective) = self.objective() {
            backend.register_objective(&format!("obj__{}", objective.label()), objective)?;
        }
        self.durations.to_math_model = start.elapsed();

        Ok(())
    }

    /// Translate the model and solve it with the given settings.
    ///
    /// Previously retrieved results are discarded. If the solver fails, the error carries the
    /// solver's status.
    pub fn solve(&mut self, settings: &SolverSettings) -> Result<()> {
        settings.validate()?;
        self.reset_results();
        self.backend = None;
        self.objective_value = None;

        let mut backend = settings.create_backend()?;
        self.to_math_model(backend.as_mut())?;
        log::info!(
            "Translated model {} in {:.2} s",
            self.label,
            self.durations.to_math_model.as_secs_f64()
        );

        let start = Instant::now();
        let result = backend.solve(&settings.native_options());
        self.durations.solve = start.elapsed();
        self.solver_name = Some(settings.solver_name);
        result.with_context(|| format!("Failed to solve model {}", self.label))?;

        let objective_value = backend.objective_value()?;
        log::info!(
            "Solved model {} with {} in {:.2} s (objective value: {objective_value})",
            self.label,
            settings.solver_name,
            self.durations.solve.as_secs_f64()
        );
        self.objective_value = Some(objective_value);
        self.backend = Some(backend);

        Ok(())
    }

    /// Whether the model has been solved successfully
    pub fn is_solved(&self) -> bool {
        self.backend.is_some()
    }

    /// The value of the objective, once solved
    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    /// The time spent on translating and solving
    pub fn durations(&self) -> ModelDurations {
        self.durations
    }

    /// The solved values of a variable.
    ///
    /// Values are retrieved from the solver on first access and cached until the next solve.
    pub fn variable_result(&self, id: VariableId) -> Result<&ResultValue> {
        let variable = self.variable(id);
        if let Some(result) = variable.result() {
            return Ok(result);
        }

        let backend = self
            .backend
            .as_ref()
            .with_context(|| format!("Model {} has not been solved", self.label))?;
        let values = backend.extract_result(id)?;
        Ok(variable.cache_result(values))
    }

    /// Discard the cached results of all variables
    pub fn reset_results(&mut self) {
        for variable in &mut self.variables {
            variable.reset_result();
        }
    }

    /// The solved values of all variables, by label
    pub fn results(&self) -> Result<IndexMap<String, Numeric>> {
        self.variables
            .iter()
            .map(|variable| {
                let value = self.variable_result(variable.id())?.to_numeric();
                Ok((variable.label().to_string(), value))
            })
            .collect()
    }

    /// Number of variables
    pub fn nr_of_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of scalar values over all variables
    pub fn nr_of_single_variables(&self) -> usize {
        self.variables.iter().map(Variable::len).sum()
    }

    /// Number of time-series variables
    pub fn nr_of_ts_variables(&self) -> usize {
        self.variables.iter().filter(|v| v.is_time_series()).count()
    }

    /// Number of equalities
    pub fn nr_of_equations(&self) -> usize {
        self.equations_of_kind(EquationKind::Equality).count()
    }

    /// Number of rows over all equalities
    pub fn nr_of_single_equations(&self) -> usize {
        self.equations_of_kind(EquationKind::Equality)
            .map(Equation::nr_of_single_equations)
            .sum()
    }

    /// Number of inequalities
    pub fn nr_of_inequations(&self) -> usize {
        self.equations_of_kind(EquationKind::Inequality).count()
    }

    /// Number of rows over all inequalities
    pub fn nr_of_single_inequations(&self) -> usize {
        self.equations_of_kind(EquationKind::Inequality)
            .map(Equation::nr_of_single_equations)
            .sum()
    }

    /// A human-readable listing of the whole model, one line per variable and equation
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("Model {}", self.label), "Variables:".to_string()];
        lines.extend(self.variables.iter().map(Variable::description));
        lines.push("Equations:".to_string());
        lines.extend(
            self.equations_of_kind(EquationKind::Equality)
                .map(|equation| equation.description(0)),
        );
        lines.push("Inequations:".to_string());
        lines.extend(
            self.equations_of_kind(EquationKind::Inequality)
                .map(|equation| equation.description(0)),
        );
        if let Some(objective) = self.objective() {
            lines.push("Objective:".to_string());
            lines.push(objective.description(0));
        }

        lines.join("\n")
    }

    /// Summary information about the model and its solve
    pub fn infos(&self) -> ModelInfos {
        ModelInfos {
            label: self.label.clone(),
            solver_name: self.solver_name,
            objective_value: self.objective_value,
            duration_to_math_model: self.durations.to_math_model.as_secs_f64(),
            duration_solve: self.durations.solve.as_secs_f64(),
            nr_of_variables: self.nr_of_variables(),
            nr_of_single_variables: self.nr_of_single_variables(),
            nr_of_ts_variables: self.nr_of_ts_variables(),
            nr_of_equations: self.nr_of_equations(),
            nr_of_single_equations: self.nr_of_single_equations(),
            nr_of_inequations: self.nr_of_inequations(),
            nr_of_single_inequations: self.nr_of_single_inequations(),
        }
    }
}

/// Summary information about a model, as written to the info document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfos {
    /// The model's label
    pub label: String,
    /// The solver used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_name: Option<SolverName>,
    /// The value of the objective
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<f64>,
    /// Seconds spent translating the model
    pub duration_to_math_model: f64,
    /// Seconds spent solving
    pub duration_solve: f64,
    /// Number of variables
    pub nr_of_variables: usize,
    /// Number of scalar values over all variables
    pub nr_of_single_variables: usize,
    /// Number of time-series variables
    pub nr_of_ts_variables: usize,
    /// Number of equalities
    pub nr_of_equations: usize,
    /// Number of rows over all equalities
    pub nr_of_single_equations: usize,
    /// Number of inequalities
    pub nr_of_inequations: usize,
    /// Number of rows over all inequalities
    pub nr_of_single_inequations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, quiet_solver_settings};
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    /// Heat demand covered by a cheap but limited unit and an expensive unlimited one
    #[fixture]
    fn model() -> MathModel {
        let mut model = MathModel::new("test");
        let cheap = model
            .add_variable(VariableSpec::time_series("cheap", "cheap", 3).bounds(0.0, 10.0))
            .unwrap();
        let expensive = model
            .add_variable(VariableSpec::time_series("expensive", "expensive", 3).lower_bound(0.0))
            .unwrap();

        let balance = model.add_equation("balance", EquationKind::Equality).unwrap();
        model.add_summand(balance, cheap, 1.0, None, false).unwrap();
        model.add_summand(balance, expensive, 1.0, None, false).unwrap();
        model
            .add_constant(balance, vec![5.0, 15.0, 10.0])
            .unwrap();

        let objective = model.add_equation("objective", EquationKind::Objective).unwrap();
        model.add_summand(objective, cheap, 1.0, None, true).unwrap();
        model.add_summand(objective, expensive, 3.0, None, true).unwrap();

        model
    }

    #[rstest]
    fn test_solve(mut model: MathModel, quiet_solver_settings: SolverSettings) {
        model.solve(&quiet_solver_settings).unwrap();
        assert!(model.is_solved());
        // 25 units from the cheap unit, 5 from the expensive one
        assert_approx_eq!(f64, model.objective_value().unwrap(), 40.0, epsilon = 1e-6);

        let results = model.results().unwrap();
        assert_eq!(results.keys().collect::<Vec<_>>(), ["cheap", "expensive"]);
        let expensive = results["expensive"].values();
        assert_approx_eq!(f64, expensive[1], 5.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_result_cached_until_next_solve(
        mut model: MathModel,
        quiet_solver_settings: SolverSettings,
    ) {
        model.solve(&quiet_solver_settings).unwrap();
        let id = model.variable_by_label("cheap").unwrap().id();
        let first = model.variable_result(id).unwrap() as *const ResultValue;
        let second = model.variable_result(id).unwrap() as *const ResultValue;
        assert_eq!(first, second);

        model.solve(&quiet_solver_settings).unwrap();
        assert!(model.variable(id).result().is_none());
    }

    #[rstest]
    fn test_result_before_solve(model: MathModel) {
        let id = model.variable_by_label("cheap").unwrap().id();
        assert_error!(model.variable_result(id), "Model test has not been solved");
    }

    #[rstest]
    fn test_solve_infeasible(mut model: MathModel, quiet_solver_settings: SolverSettings) {
        let cheap = model.variable_by_label("cheap").unwrap().id();
        let cap = model.add_equation("cap", EquationKind::Equality).unwrap();
        model.add_summand(cap, cheap, 1.0, None, false).unwrap();
        model.add_constant(cap, -1.0).unwrap();

        assert_error!(
            model.solve(&quiet_solver_settings),
            "Failed to solve model test"
        );
        assert!(!model.is_solved());
    }

    #[rstest]
    fn test_unknown_backend(mut model: MathModel) {
        let settings = SolverSettings {
            solver_name: SolverName::Glpk,
            ..SolverSettings::default()
        };
        assert_error!(
            model.solve(&settings),
            "No backend is available for solver glpk"
        );
    }

    #[rstest]
    fn test_duplicate_labels(mut model: MathModel) {
        assert_error!(
            model.add_variable(VariableSpec::scalar("cheap", "cheap")),
            "Label cheap is already used in model test"
        );
        assert_error!(
            model.add_equation("other", EquationKind::Objective),
            "Model test already has an objective"
        );
    }

    #[rstest]
    fn test_counts(model: MathModel) {
        let infos = model.infos();
        assert_eq!(infos.nr_of_variables, 2);
        assert_eq!(infos.nr_of_single_variables, 6);
        assert_eq!(infos.nr_of_ts_variables, 2);
        assert_eq!(infos.nr_of_equations, 1);
        assert_eq!(infos.nr_of_single_equations, 3);
        assert_eq!(infos.nr_of_inequations, 0);
        assert_eq!(infos.solver_name, None);
    }

    #[rstest]
    fn test_describe(model: MathModel) {
        let description = model.describe();
        assert!(description.starts_with("Model test\nVariables:\n"));
        assert!(description.contains("\"expensive\""));
        assert!(description.contains("EQ balance [1/3]"));
        assert!(description.contains("OBJ"));
    }
}
