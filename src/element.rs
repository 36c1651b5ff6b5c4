//! The contract between the energy system and the elements it is built from.
//!
//! Elements (components, buses, effects and helpers such as the period equalisation of aggregated
//! calculations) create their own variables and equations. The energy system only decides the
//! order in which they do so.
use crate::calculation::results::ResultTree;
use crate::math_model::variable::VariableId;
use crate::numeric::Numeric;
use crate::system_model::SystemModel;
use crate::time::TimeSeries;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A part of an energy system which contributes variables and equations to its models
pub trait Element: Debug {
    /// Label of the element, unique within the energy system
    fn label(&self) -> &str;

    /// Check and prepare the element's parameters before any model is built
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// The element's time-dependent input data
    fn time_series(&self) -> Vec<&TimeSeries> {
        Vec::new()
    }

    /// Mutable access to the element's time-dependent input data
    fn time_series_mut(&mut self) -> Vec<&mut TimeSeries> {
        Vec::new()
    }

    /// Whether the element has investment decisions (i.e. sizes to be optimised)
    fn has_investment(&self) -> bool {
        false
    }

    /// Create the variables and (empty) equations of the element in a new model
    fn declare_vars_and_eqs(&mut self, model: &mut SystemModel) -> Result<()>;

    /// Fill the element's equations
    fn do_modeling(&mut self, model: &mut SystemModel) -> Result<()>;

    /// Add the element's contributions (costs, emissions, ...) to the global effects
    fn add_share_to_globals(
        &mut self,
        _globals: &mut dyn Globals,
        _model: &mut SystemModel,
    ) -> Result<()> {
        Ok(())
    }

    /// The variables the element created in the current model
    fn variables(&self) -> Vec<VariableId>;

    /// The element's results from a solved model
    fn results(&self, model: &SystemModel) -> Result<ResultTree> {
        ResultTree::from_variables(model, &self.variables())
    }
}

/// Whether a share is incurred by operation or by investment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareCategory {
    /// A share per time step
    Operation,
    /// A one-off share
    Invest,
}

/// A contribution of an element to an effect
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    /// Label describing the contribution, e.g. `Boiler__Q_fu__costs`
    pub label: String,
    /// The effect receiving the share. If `None`, the standard effect is used.
    pub effect: Option<String>,
    /// Whether the share is incurred by operation or by investment
    pub category: ShareCategory,
    /// The variable the share is proportional to. If `None`, `factor` is a constant share.
    pub variable: Option<VariableId>,
    /// Factor per time step (operation) or a single factor (investment)
    pub factor: Numeric,
    /// Whether the sum over all entries of the variable is used
    pub as_sum: bool,
}

impl Share {
    /// A share proportional to a variable
    pub fn of_variable(
        label: impl Into<String>,
        effect: Option<&str>,
        category: ShareCategory,
        variable: VariableId,
        factor: impl Into<Numeric>,
    ) -> Self {
        Self {
            label: label.into(),
            effect: effect.map(ToString::to_string),
            category,
            variable: Some(variable),
            factor: factor.into(),
            as_sum: false,
        }
    }

    /// A constant share
    pub fn constant(
        label: impl Into<String>,
        effect: Option<&str>,
        category: ShareCategory,
        value: impl Into<Numeric>,
    ) -> Self {
        Self {
            label: label.into(),
            effect: effect.map(ToString::to_string),
            category,
            variable: None,
            factor: value.into(),
            as_sum: false,
        }
    }

    /// Use the sum over all entries of the variable
    pub fn summed(mut self) -> Self {
        self.as_sum = true;
        self
    }
}

/// The receiver of the shares of all elements
pub trait Globals {
    /// Add a share to an effect
    fn add_share(&mut self, model: &mut SystemModel, share: Share) -> Result<()>;
}

/// The effects of an energy system (costs, emissions, ...), one of which is the standard effect
/// that is minimised
pub trait EffectCollection: Element + Globals {
    /// Terms of the objective, summed over all entries of each variable
    fn objective_terms(&self) -> Vec<(VariableId, f64)>;

    /// Pairs `(from, to)` of effects where `from` contributes a share to `to`
    fn share_links(&self) -> Vec<(String, String)>;

    /// This collection as the receiver of shares
    fn as_globals(&mut self) -> &mut dyn Globals;
}
