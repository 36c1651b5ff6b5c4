//! Results of a calculation as a nested mapping from element labels to variable values.
//!
//! Results of the windows of a segmented calculation are combined by taking the retained part of
//! each window and appending it to the results of the previous windows.
use crate::math_model::variable::VariableId;
use crate::numeric::Numeric;
use crate::system_model::SystemModel;
use crate::time::TimeData;
use anyhow::{Context, Result, bail, ensure};
use indexmap::IndexMap;
use indexmap::map::Entry;

/// The values of a single variable
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLeaf {
    /// The values
    pub value: Numeric,
    /// Whether the values include the boundary at the end of the last time step
    pub boundary_inclusive: bool,
}

impl ResultLeaf {
    /// The values retained from a window.
    ///
    /// Boundary-inclusive values are taken for indices `0..=used` in the first window and
    /// `1..=used` in later windows, as index 0 repeats the last value of the previous window.
    /// Other values are taken for indices `0..used`. Scalars count as vectors of length one and
    /// ranges are cut off at the end of the available values.
    fn retained(&self, real_nr_of_used_steps: usize, first_window: bool) -> Self {
        let values = self.value.values();
        let (start, end) = match (self.boundary_inclusive, first_window) {
            (true, true) => (0, real_nr_of_used_steps + 1),
            (true, false) => (1, real_nr_of_used_steps + 1),
            (false, _) => (0, real_nr_of_used_steps),
        };
        let end = end.min(values.len());
        let start = start.min(end);

        Self {
            value: Numeric::Vector(values[start..end].to_vec()),
            boundary_inclusive: self.boundary_inclusive,
        }
    }
}

/// A node of a [`ResultTree`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResultNode {
    /// The values of a variable
    Leaf(ResultLeaf),
    /// Nested results, e.g. those of an element
    Branch(ResultTree),
}

/// Nested results, keyed by label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTree(IndexMap<String, ResultNode>);

impl ResultTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// The results of variables of a solved model, keyed by their short labels
    pub fn from_variables(model: &SystemModel, variables: &[VariableId]) -> Result<Self> {
        let mut tree = Self::new();
        for &id in variables {
            let variable = model.variable(id);
            let leaf = ResultLeaf {
                value: model.variable_result(id)?.to_numeric(),
                boundary_inclusive: variable.is_boundary_inclusive(),
            };
            tree.insert_leaf(variable.label_short(), leaf)?;
        }

        Ok(tree)
    }

    fn insert(&mut self, key: String, node: ResultNode) -> Result<()> {
        match self.0.entry(key) {
            Entry::Occupied(entry) => bail!("Duplicate result entry {}", entry.key()),
            Entry::Vacant(entry) => {
                entry.insert(node);
            }
        }

        Ok(())
    }

    /// Add the values of a variable
    pub fn insert_leaf(&mut self, key: impl Into<String>, leaf: ResultLeaf) -> Result<()> {
        self.insert(key.into(), ResultNode::Leaf(leaf))
    }

    /// Add nested results
    pub fn insert_branch(&mut self, key: impl Into<String>, tree: ResultTree) -> Result<()> {
        self.insert(key.into(), ResultNode::Branch(tree))
    }

    /// Add a node at a path, creating intermediate branches as needed
    pub fn insert_at_path(&mut self, path: &[String], node: ResultNode) -> Result<()> {
        let Some((key, rest)) = path.split_first() else {
            bail!("Cannot insert a result at an empty path");
        };
        if rest.is_empty() {
            return self.insert(key.clone(), node);
        }

        let child = self
            .0
            .entry(key.clone())
            .or_insert_with(|| ResultNode::Branch(ResultTree::new()));
        match child {
            ResultNode::Branch(tree) => tree.insert_at_path(rest, node),
            ResultNode::Leaf(_) => bail!("Result entry {key} is not a branch"),
        }
    }

    /// Get a direct child
    pub fn get(&self, key: &str) -> Option<&ResultNode> {
        self.0.get(key)
    }

    /// Get a node by its path of labels
    pub fn get_path(&self, path: &[&str]) -> Option<&ResultNode> {
        let (key, rest) = path.split_first()?;
        let node = self.0.get(*key)?;
        if rest.is_empty() {
            return Some(node);
        }
        match node {
            ResultNode::Branch(tree) => tree.get_path(rest),
            ResultNode::Leaf(_) => None,
        }
    }

    /// Get the values at a path
    pub fn leaf(&self, path: &[&str]) -> Option<&ResultLeaf> {
        match self.get_path(path)? {
            ResultNode::Leaf(leaf) => Some(leaf),
            ResultNode::Branch(_) => None,
        }
    }

    /// Iterate over the direct children
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResultNode)> {
        self.0.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no children
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The part of a window's results which is retained when combining windows
    pub fn retained(&self, real_nr_of_used_steps: usize, first_window: bool) -> Self {
        Self(
            self.0
                .iter()
                .map(|(key, node)| {
                    let node = match node {
                        ResultNode::Leaf(leaf) => {
                            ResultNode::Leaf(leaf.retained(real_nr_of_used_steps, first_window))
                        }
                        ResultNode::Branch(tree) => {
                            ResultNode::Branch(tree.retained(real_nr_of_used_steps, first_window))
                        }
                    };
                    (key.clone(), node)
                })
                .collect(),
        )
    }

    /// Append the values of another tree with the same structure to this one
    pub fn append(&mut self, other: ResultTree) -> Result<()> {
        ensure!(
            self.0.len() == other.0.len(),
            "Cannot combine results with {} entries and results with {} entries",
            self.0.len(),
            other.0.len()
        );

        for (key, other_node) in other.0 {
            let node = self
                .0
                .get_mut(&key)
                .with_context(|| format!("Result entry {key} is missing"))?;
            match (node, other_node) {
                (ResultNode::Leaf(leaf), ResultNode::Leaf(other_leaf)) => {
                    ensure!(
                        leaf.boundary_inclusive == other_leaf.boundary_inclusive,
                        "Result entry {key} changes whether it includes the final boundary"
                    );
                    let mut values = leaf.value.values();
                    values.extend(other_leaf.value.values());
                    leaf.value = Numeric::Vector(values);
                }
                (ResultNode::Branch(tree), ResultNode::Branch(other_tree)) => tree
                    .append(other_tree)
                    .with_context(|| format!("Cannot combine results of {key}"))?,
                _ => bail!("Result entry {key} is a value in one result and nested in the other"),
            }
        }

        Ok(())
    }

    /// All leaves with their paths, depth first
    pub fn leaves(&self) -> Vec<(Vec<String>, &ResultLeaf)> {
        let mut leaves = Vec::new();
        for (key, node) in &self.0 {
            match node {
                ResultNode::Leaf(leaf) => leaves.push((vec![key.clone()], leaf)),
                ResultNode::Branch(tree) => {
                    for (mut path, leaf) in tree.leaves() {
                        path.insert(0, key.clone());
                        leaves.push((path, leaf));
                    }
                }
            }
        }

        leaves
    }
}

/// The results of a calculation together with its time information
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationResults {
    /// Results by element label
    pub tree: ResultTree,
    /// The time steps the results refer to
    pub time: TimeData,
}
