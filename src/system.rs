//! The energy system: the elements to be modelled and the time axis they are modelled on.
use crate::calculation::results::ResultTree;
use crate::element::{EffectCollection, Element, Globals};
use crate::math_model::equation::EquationKind;
use crate::system_model::SystemModel;
use crate::time::{TimeAxis, TimeSeries};
use anyhow::{Context, Result, anyhow, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::graph::Graph;
use std::collections::{HashMap, HashSet};

/// Label of the objective equation
const OBJECTIVE_LABEL: &str = "objective";

/// An energy system made up of effects, components, buses and other elements.
///
/// Models are built in a fixed order: effects first, then the objective, components, buses and
/// finally all other elements (including temporary ones).
#[derive(Debug)]
pub struct EnergySystem {
    time_axis: TimeAxis,
    effects: Box<dyn EffectCollection>,
    components: Vec<Box<dyn Element>>,
    buses: Vec<Box<dyn Element>>,
    others: Vec<Box<dyn Element>>,
    temporary: Vec<Box<dyn Element>>,
    finalized: bool,
}

impl EnergySystem {
    /// Create an energy system with no elements other than its effects
    pub fn new(time_axis: TimeAxis, effects: Box<dyn EffectCollection>) -> Result<Self> {
        check_label_format(effects.label())?;

        Ok(Self {
            time_axis,
            effects,
            components: Vec::new(),
            buses: Vec::new(),
            others: Vec::new(),
            temporary: Vec::new(),
            finalized: false,
        })
    }

    /// The time axis of the system
    pub fn time_axis(&self) -> &TimeAxis {
        &self.time_axis
    }

    /// Every element except the effects, in modelling order
    fn elements(&self) -> impl Iterator<Item = &dyn Element> {
        self.components
            .iter()
            .chain(&self.buses)
            .chain(&self.others)
            .chain(&self.temporary)
            .map(|element| &**element as &dyn Element)
    }

    /// Labels of all elements, starting with the effects
    pub fn element_labels(&self) -> Vec<&str> {
        std::iter::once(self.effects.label())
            .chain(self.elements().map(Element::label))
            .collect()
    }

    fn check_new_label(&self, label: &str) -> Result<()> {
        check_label_format(label)?;
        ensure!(
            !self.element_labels().contains(&label),
            "An element with label {label} already exists"
        );

        Ok(())
    }

    fn check_not_finalized(&self) -> Result<()> {
        ensure!(
            !self.finalized,
            "Elements cannot be added once the energy system is finalized"
        );

        Ok(())
    }

    /// Add a component (an element with flows, e.g. a boiler)
    pub fn add_component(&mut self, component: Box<dyn Element>) -> Result<()> {
        self.check_not_finalized()?;
        self.check_new_label(component.label())?;
        self.components.push(component);

        Ok(())
    }

    /// Add a bus (a node balancing flows)
    pub fn add_bus(&mut self, bus: Box<dyn Element>) -> Result<()> {
        self.check_not_finalized()?;
        self.check_new_label(bus.label())?;
        self.buses.push(bus);

        Ok(())
    }

    /// Add any other element
    pub fn add_element(&mut self, element: Box<dyn Element>) -> Result<()> {
        self.check_not_finalized()?;
        self.check_new_label(element.label())?;
        self.others.push(element);

        Ok(())
    }

    /// Add an element which only belongs to the next calculation.
    ///
    /// Temporary elements are finalized straight away. They remain part of the system until
    /// [`EnergySystem::delete_temporary_elements`] is called.
    pub fn add_temporary_element(&mut self, mut element: Box<dyn Element>) -> Result<()> {
        self.check_new_label(element.label())?;
        element
            .finalize()
            .with_context(|| format!("Failed to finalize element {}", element.label()))?;
        self.temporary.push(element);

        Ok(())
    }

    /// Remove all temporary elements
    pub fn delete_temporary_elements(&mut self) {
        for element in self.temporary.drain(..) {
            log::debug!("Deleted temporary element {}", element.label());
        }
    }

    /// Whether any temporary elements are registered
    pub fn has_temporary_elements(&self) -> bool {
        !self.temporary.is_empty()
    }

    /// Labels of the temporary elements
    pub fn temporary_element_labels(&self) -> Vec<&str> {
        self.temporary.iter().map(|element| element.label()).collect()
    }

    /// Whether the system has been finalized
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Check the system for plausibility and finalize all elements.
    ///
    /// Only the first call has an effect.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        check_share_links(&self.effects.share_links())?;
        self.effects
            .finalize()
            .with_context(|| format!("Failed to finalize element {}", self.effects.label()))?;
        for element in self
            .components
            .iter_mut()
            .chain(&mut self.buses)
            .chain(&mut self.others)
        {
            element
                .finalize()
                .with_context(|| format!("Failed to finalize element {}", element.label()))?;
        }
        self.finalized = true;
        log::debug!("Energy system finalized");

        Ok(())
    }

    /// The labels of elements with investment decisions
    pub fn elements_with_investment(&self) -> Vec<&str> {
        let effects = self
            .effects
            .has_investment()
            .then(|| self.effects.label());
        effects
            .into_iter()
            .chain(
                self.elements()
                    .filter(|element| element.has_investment())
                    .map(Element::label),
            )
            .collect()
    }

    /// All time series of all elements
    pub fn time_series(&self) -> Vec<&TimeSeries> {
        self.effects
            .time_series()
            .into_iter()
            .chain(self.elements().flat_map(|element| element.time_series()))
            .collect()
    }

    /// All time series with one value per time step
    pub fn array_time_series(&self) -> Vec<&TimeSeries> {
        self.time_series()
            .into_iter()
            .filter(|series| series.is_array())
            .collect()
    }

    /// Select the data of every time series for the given time indices.
    ///
    /// # Arguments
    ///
    /// * `indices` - Indices of the time axis
    /// * `explicit` - Data replacing that of the time series with the given labels
    pub fn activate_time_series(
        &mut self,
        indices: &[usize],
        explicit: Option<&IndexMap<String, Vec<f64>>>,
    ) -> Result<()> {
        let series = self.effects.time_series_mut().into_iter().chain(
            self.components
                .iter_mut()
                .chain(&mut self.buses)
                .chain(&mut self.others)
                .chain(&mut self.temporary)
                .flat_map(|element| element.time_series_mut()),
        );

        let mut used_labels = HashSet::new();
        for series in series {
            let values = explicit.and_then(|explicit| explicit.get(series.label()));
            if values.is_some() {
                used_labels.insert(series.label().to_string());
            }
            series.activate(indices, values.map(Vec::as_slice))?;
        }

        if let Some(explicit) = explicit {
            let unknown = explicit
                .keys()
                .filter(|label| !used_labels.contains(*label))
                .join(", ");
            ensure!(
                unknown.is_empty(),
                "Explicit data was given for unknown time series: {unknown}"
            );
        }

        Ok(())
    }

    /// Build the variables and equations of all elements in a model.
    ///
    /// The time series are activated for the model's time indices first.
    pub fn do_modeling(&mut self, model: &mut SystemModel) -> Result<()> {
        ensure!(
            self.finalized,
            "The energy system must be finalized before it is modelled"
        );
        let indices = model.time_indices().to_vec();
        self.activate_time_series(&indices, model.explicit_time_series())?;

        let effects_label = self.effects.label().to_string();
        self.effects
            .declare_vars_and_eqs(model)
            .and_then(|()| self.effects.do_modeling(model))
            .with_context(|| format!("Failed to model element {effects_label}"))?;

        let objective = model.add_equation(OBJECTIVE_LABEL, EquationKind::Objective)?;
        for (variable, factor) in self.effects.objective_terms() {
            model.add_summand(objective, variable, factor, None, true)?;
        }

        let globals = self.effects.as_globals();
        for component in &mut self.components {
            model_element(component.as_mut(), globals, model)?;
            model.add_component_variables(component.variables());
        }
        for element in self
            .buses
            .iter_mut()
            .chain(&mut self.others)
            .chain(&mut self.temporary)
        {
            model_element(element.as_mut(), globals, model)?;
        }
        log::info!(
            "Modelled {} elements in model {}",
            1 + self.components.len() + self.buses.len() + self.others.len() + self.temporary.len(),
            model.label()
        );

        Ok(())
    }

    /// The results of all elements from a solved model, by element label
    pub fn results(&self, model: &SystemModel) -> Result<ResultTree> {
        let mut tree = ResultTree::new();
        let effects = self
            .effects
            .results(model)
            .with_context(|| format!("Failed to get results of element {}", self.effects.label()))?;
        tree.insert_branch(self.effects.label(), effects)?;
        for element in self.elements() {
            let results = element
                .results(model)
                .with_context(|| format!("Failed to get results of element {}", element.label()))?;
            tree.insert_branch(element.label(), results)?;
        }

        Ok(tree)
    }
}

/// Model a single element
fn model_element(
    element: &mut dyn Element,
    globals: &mut dyn Globals,
    model: &mut SystemModel,
) -> Result<()> {
    element
        .declare_vars_and_eqs(model)
        .and_then(|()| element.do_modeling(model))
        .and_then(|()| element.add_share_to_globals(globals, model))
        .with_context(|| format!("Failed to model element {}", element.label()))
}

/// Element labels are used as path components in results
fn check_label_format(label: &str) -> Result<()> {
    ensure!(!label.is_empty(), "Element labels must not be empty");
    ensure!(
        !label.contains('/'),
        "Element label {label} must not contain '/'"
    );

    Ok(())
}

/// Check that effects do not contribute shares to each other in a circle
fn check_share_links(links: &[(String, String)]) -> Result<()> {
    let mut graph = Graph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for (from, to) in links {
        let from = *nodes
            .entry(from.as_str())
            .or_insert_with(|| graph.add_node(from.as_str()));
        let to = *nodes
            .entry(to.as_str())
            .or_insert_with(|| graph.add_node(to.as_str()));
        graph.add_edge(from, to, ());
    }

    toposort(&graph, None).map_err(|cycle| {
        anyhow!(
            "Circular share definition involving effect {}",
            graph[cycle.node_id()]
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Share, ShareCategory};
    use crate::fixture::{assert_error, time_axis};
    use crate::math_model::variable::{VariableId, VariableSpec};
    use crate::numeric::Numeric;
    use rstest::{fixture, rstest};

    /// A single effect whose total is the objective
    #[derive(Debug, Default)]
    struct Costs {
        links: Vec<(String, String)>,
        total: Option<VariableId>,
        shares: usize,
    }

    impl Element for Costs {
        fn label(&self) -> &str {
            "costs"
        }

        fn declare_vars_and_eqs(&mut self, model: &mut SystemModel) -> Result<()> {
            let total = VariableSpec::scalar("costs__total", "total");
            self.total = Some(model.add_variable(total)?);
            Ok(())
        }

        fn do_modeling(&mut self, _model: &mut SystemModel) -> Result<()> {
            Ok(())
        }

        fn variables(&self) -> Vec<VariableId> {
            self.total.into_iter().collect()
        }
    }

    impl Globals for Costs {
        fn add_share(&mut self, _model: &mut SystemModel, _share: Share) -> Result<()> {
            self.shares += 1;
            Ok(())
        }
    }

    impl EffectCollection for Costs {
        fn objective_terms(&self) -> Vec<(VariableId, f64)> {
            self.total.map(|id| (id, 1.0)).into_iter().collect()
        }

        fn share_links(&self) -> Vec<(String, String)> {
            self.links.clone()
        }

        fn as_globals(&mut self) -> &mut dyn Globals {
            self
        }
    }

    /// An element with one time series and one variable
    #[derive(Debug)]
    struct Unit {
        label: String,
        series: TimeSeries,
        variable: Option<VariableId>,
        finalized: usize,
    }

    impl Unit {
        fn new(label: &str) -> Box<Self> {
            Box::new(Self {
                label: label.into(),
                series: TimeSeries::new(
                    format!("{label}__profile"),
                    (0..9).map(f64::from).collect::<Vec<_>>(),
                ),
                variable: None,
                finalized: 0,
            })
        }
    }

    impl Element for Unit {
        fn label(&self) -> &str {
            &self.label
        }

        fn finalize(&mut self) -> Result<()> {
            self.finalized += 1;
            Ok(())
        }

        fn time_series(&self) -> Vec<&TimeSeries> {
            vec![&self.series]
        }

        fn time_series_mut(&mut self) -> Vec<&mut TimeSeries> {
            vec![&mut self.series]
        }

        fn declare_vars_and_eqs(&mut self, model: &mut SystemModel) -> Result<()> {
            let spec = VariableSpec::time_series(
                format!("{}__flow", self.label),
                "flow",
                model.nr_of_time_steps(),
            )
            .fixed(self.series.active_data()?.clone());
            self.variable = Some(model.add_variable(spec)?);
            Ok(())
        }

        fn do_modeling(&mut self, _model: &mut SystemModel) -> Result<()> {
            Ok(())
        }

        fn add_share_to_globals(
            &mut self,
            globals: &mut dyn Globals,
            model: &mut SystemModel,
        ) -> Result<()> {
            let variable = self.variable.context("Not declared")?;
            globals.add_share(
                model,
                Share::of_variable("flow_costs", None, ShareCategory::Operation, variable, 1.0),
            )
        }

        fn variables(&self) -> Vec<VariableId> {
            self.variable.into_iter().collect()
        }
    }

    #[fixture]
    fn system(time_axis: TimeAxis) -> EnergySystem {
        let mut system = EnergySystem::new(time_axis, Box::new(Costs::default())).unwrap();
        system.add_component(Unit::new("Boiler")).unwrap();
        system.add_bus(Unit::new("Heat")).unwrap();
        system
    }

    #[rstest]
    fn test_duplicate_label(mut system: EnergySystem) {
        assert_error!(
            system.add_element(Unit::new("Boiler")),
            "An element with label Boiler already exists"
        );
        assert_error!(
            system.add_element(Unit::new("costs")),
            "An element with label costs already exists"
        );
        assert_error!(
            system.add_element(Unit::new("a/b")),
            "Element label a/b must not contain '/'"
        );
    }

    #[rstest]
    fn test_finalize_once(mut system: EnergySystem) {
        system.finalize().unwrap();
        system.finalize().unwrap();
        assert!(system.is_finalized());
        assert_error!(
            system.add_component(Unit::new("Chp")),
            "Elements cannot be added once the energy system is finalized"
        );
    }

    #[test]
    fn test_check_share_links() {
        let link = |from: &str, to: &str| (from.to_string(), to.to_string());
        assert!(check_share_links(&[link("CO2", "costs"), link("PE", "CO2")]).is_ok());
        assert_error!(
            check_share_links(&[link("A", "B"), link("B", "A")]),
            "Circular share definition involving effect B"
        );
    }

    #[rstest]
    fn test_finalize_circular_shares(time_axis: TimeAxis) {
        let costs = Costs {
            links: vec![("costs".into(), "costs".into())],
            ..Costs::default()
        };
        let mut system = EnergySystem::new(time_axis, Box::new(costs)).unwrap();
        assert_error!(
            system.finalize(),
            "Circular share definition involving effect costs"
        );
    }

    #[rstest]
    fn test_temporary_elements(mut system: EnergySystem) {
        system.finalize().unwrap();
        system.add_temporary_element(Unit::new("helper")).unwrap();
        assert!(system.has_temporary_elements());
        assert_eq!(system.temporary_element_labels(), ["helper"]);
        system.delete_temporary_elements();
        assert!(!system.has_temporary_elements());
    }

    #[rstest]
    fn test_activate_time_series(mut system: EnergySystem) {
        system.activate_time_series(&[2, 3], None).unwrap();
        assert_eq!(
            system.time_series()[0].active_data().unwrap(),
            &Numeric::from([2.0, 3.0])
        );

        let explicit = IndexMap::from([("Heat__profile".to_string(), vec![7.0, 7.0])]);
        system.activate_time_series(&[2, 3], Some(&explicit)).unwrap();
        assert_eq!(
            system.time_series()[1].active_data().unwrap(),
            &Numeric::from([7.0, 7.0])
        );

        let explicit = IndexMap::from([("Cooler__profile".to_string(), vec![7.0, 7.0])]);
        assert_error!(
            system.activate_time_series(&[2, 3], Some(&explicit)),
            "Explicit data was given for unknown time series: Cooler__profile"
        );
    }

    #[rstest]
    fn test_do_modeling(mut system: EnergySystem, time_axis: TimeAxis) {
        let mut model = SystemModel::new("test", &time_axis, vec![0, 1, 2], None).unwrap();
        assert_error!(
            system.do_modeling(&mut model),
            "The energy system must be finalized before it is modelled"
        );

        system.finalize().unwrap();
        system.do_modeling(&mut model).unwrap();
        assert_eq!(model.nr_of_variables(), 3);
        assert_eq!(model.objective().unwrap().label(), "objective");
        assert_eq!(model.component_variables().len(), 1);
        assert_eq!(system.array_time_series().len(), 2);
    }
}
