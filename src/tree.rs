//! A recursive-partition tree is the core data structure for Bayesian
//! Additive Regression Trees (BART). The tree is implemented as an arena of
//! nodes addressed by index, plus one shared buffer of observation indices
//! that every node views a contiguous slice of.
//!
//! This module provides:
//! - whole-tree queries: the leaf, internal, nog and swappable node lists
//! - validation of the partition invariants
//! - growth from the tree prior
//! - conversion between leaf values and per-observation fits
//! - remapping rules onto a new cut-point grid

use std::fmt;

use log::debug;
use rand::Rng;

use crate::context::TreeContext;
use crate::data::{CutPoints, VariableType, MAX_NUM_CATEGORIES};
use crate::errors::TreeError;
use crate::node::{Node, NodeId, NodeKind};
use crate::ops::{EndNodeModel, TreePrior};
use crate::rule::Rule;

/// Arena index of the root, which is never freed.
pub const ROOT: NodeId = 0;

/// A binary recursive-partition tree over a fixed set of observations.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) free: Vec<NodeId>,
    pub(crate) indices: Vec<usize>,
    pub(crate) num_predictors: usize,
}

/// Range of split values still reaching a node for one variable.
#[derive(Debug, Clone, Copy)]
enum SplitSpace {
    Ordinal { lo: i64, hi: i64 },
    Categorical { available: u32 },
}

impl SplitSpace {
    fn is_splittable(&self) -> bool {
        match *self {
            SplitSpace::Ordinal { lo, hi } => lo <= hi,
            SplitSpace::Categorical { available } => available.count_ones() >= 2,
        }
    }

    fn restrict(&mut self, rule: &Rule, went_right: bool) {
        match self {
            SplitSpace::Ordinal { lo, hi } => {
                let k = i64::from(rule.split_index());
                if went_right {
                    *lo = (*lo).max(k + 1);
                } else {
                    *hi = (*hi).min(k - 1);
                }
            }
            SplitSpace::Categorical { available } => {
                if went_right {
                    *available &= rule.category_directions();
                } else {
                    *available &= !rule.category_directions();
                }
            }
        }
    }

    /// Draws a rule on `variable` and whether each side is left without
    /// split values.
    fn draw<R: Rng + ?Sized>(&self, rng: &mut R, variable: usize) -> (Rule, bool, bool) {
        match *self {
            SplitSpace::Ordinal { lo, hi } => {
                let k = rng.gen_range(lo..=hi);
                (Rule::ordinal(variable, k as usize), k == lo, k == hi)
            }
            SplitSpace::Categorical { available } => {
                let num_available = available.count_ones();
                // neither side may be empty
                let draw: u64 = rng.gen_range(1..(1u64 << num_available) - 1);
                let mut directions = 0u32;
                let mut slot = 0;
                for category in 0..MAX_NUM_CATEGORIES as u32 {
                    if available & (1 << category) == 0 {
                        continue;
                    }
                    if draw & (1 << slot) != 0 {
                        directions |= 1 << category;
                    }
                    slot += 1;
                }
                let num_right = directions.count_ones();
                (
                    Rule::categorical(variable, directions),
                    num_available - num_right < 2,
                    num_right < 2,
                )
            }
        }
    }
}

impl Tree {
    /// Creates a new `Tree` holding a single root leaf over
    /// `num_observations` observations with every variable available.
    pub fn new(num_observations: usize, num_predictors: usize) -> Self {
        let mut root = Node::leaf(None, vec![true; num_predictors], 0, num_observations);
        root.kind = NodeKind::Leaf {
            average: 0.0,
            num_effective_observations: num_observations as f64,
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            indices: (0..num_observations).collect(),
            num_predictors,
        }
    }

    /// Collapses the tree back to a single root leaf.
    pub fn reset(&mut self) {
        let num_observations = self.indices.len();
        *self = Self::new(num_observations, self.num_predictors);
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        self.node(ROOT)
    }

    /// Number of observations partitioned by the tree.
    pub fn num_observations(&self) -> usize {
        self.indices.len()
    }

    /// Number of predictors rules may split on.
    pub fn num_predictors(&self) -> usize {
        self.num_predictors
    }

    /// The shared observation index buffer.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Whether the tree consists of the root only.
    pub fn has_single_node(&self) -> bool {
        self.root().is_bottom()
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    pub(crate) fn release(&mut self, id: NodeId) -> Node {
        match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => {
                self.free.push(id);
                node
            }
            None => panic!("node {} released twice", id),
        }
    }

    fn release_subtree(&mut self, id: NodeId) {
        let node = self.release(id);
        if let Some((left, right)) = node.children() {
            self.release_subtree(left);
            self.release_subtree(right);
        }
    }

    /// Leaves in left-to-right order.
    pub fn get_bottom_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_bottom_nodes(ROOT, &mut result);
        result
    }

    fn fill_bottom_nodes(&self, id: NodeId, result: &mut Vec<NodeId>) {
        match self.node(id).children() {
            None => result.push(id),
            Some((left, right)) => {
                self.fill_bottom_nodes(left, result);
                self.fill_bottom_nodes(right, result);
            }
        }
    }

    /// Internal nodes, descendants before ancestors.
    pub fn get_not_bottom_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_not_bottom_nodes(ROOT, &mut result);
        result
    }

    fn fill_not_bottom_nodes(&self, id: NodeId, result: &mut Vec<NodeId>) {
        let Some((left, right)) = self.node(id).children() else {
            return;
        };
        if !self.children_are_bottom(id) {
            self.fill_not_bottom_nodes(left, result);
            self.fill_not_bottom_nodes(right, result);
        }
        result.push(id);
    }

    /// Internal nodes whose children are both leaves.
    pub fn get_no_grand_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_no_grand_nodes(ROOT, &mut result);
        result
    }

    fn fill_no_grand_nodes(&self, id: NodeId, result: &mut Vec<NodeId>) {
        let Some((left, right)) = self.node(id).children() else {
            return;
        };
        if self.children_are_bottom(id) {
            result.push(id);
        } else {
            self.fill_no_grand_nodes(left, result);
            self.fill_no_grand_nodes(right, result);
        }
    }

    /// Internal nodes that are not nog nodes, descendants before ancestors.
    pub fn get_swappable_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        self.fill_swappable_nodes(ROOT, &mut result);
        result
    }

    fn fill_swappable_nodes(&self, id: NodeId, result: &mut Vec<NodeId>) {
        let Some((left, right)) = self.node(id).children() else {
            return;
        };
        if self.children_are_bottom(id) {
            return;
        }

        let leaf_or_nog = |child: NodeId| self.node(child).is_bottom() || self.children_are_bottom(child);
        if leaf_or_nog(left) && leaf_or_nog(right) {
            result.push(id);
            return;
        }

        self.fill_swappable_nodes(left, result);
        self.fill_swappable_nodes(right, result);
        result.push(id);
    }

    /// Number of leaves.
    pub fn get_num_bottom_nodes(&self) -> usize {
        self.get_bottom_nodes().len()
    }

    /// Number of internal nodes.
    pub fn get_num_not_bottom_nodes(&self) -> usize {
        self.get_not_bottom_nodes().len()
    }

    /// Number of nog nodes.
    pub fn get_num_no_grand_nodes(&self) -> usize {
        self.get_no_grand_nodes().len()
    }

    /// Number of swappable nodes.
    pub fn get_num_swappable_nodes(&self) -> usize {
        self.get_swappable_nodes().len()
    }

    /// Numbers the leaves left to right and returns how many there are.
    pub fn enumerate_bottom_nodes(&mut self) -> usize {
        self.get_and_enumerate_bottom_nodes().len()
    }

    /// Numbers the leaves left to right and returns them in that order.
    pub fn get_and_enumerate_bottom_nodes(&mut self) -> Vec<NodeId> {
        let leaves = self.get_bottom_nodes();
        for (index, &leaf) in leaves.iter().enumerate() {
            self.node_mut(leaf).enumeration_index = Some(index);
        }
        leaves
    }

    /// Adds the number of rules splitting on each variable to `variable_counts`.
    pub fn count_variable_uses(&self, variable_counts: &mut [u32]) {
        self.count_variable_uses_below(ROOT, variable_counts);
    }

    /// Checks the structural invariants of the tree.
    ///
    /// Views must nest and tile their parents, availability masks may only
    /// narrow down the tree, and the index buffer must be a permutation of
    /// the observations.
    pub fn validate(&self) -> Result<(), TreeError> {
        let violation = |node: NodeId, detail: String| Err(TreeError::InvariantViolation { node, detail });

        let Some(root) = self.get_node(ROOT) else {
            return violation(ROOT, "root slot is empty".to_string());
        };
        if !root.is_top() {
            return violation(ROOT, "root has a parent".to_string());
        }
        if root.view() != (0, self.indices.len()) {
            return violation(
                ROOT,
                format!("root view {:?} does not cover {} observations", root.view(), self.indices.len()),
            );
        }

        let mut reachable = 0;
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            reachable += 1;
            let node = self.node(id);
            if node.variables_available_for_split.len() != self.num_predictors {
                return violation(id, "availability mask has the wrong length".to_string());
            }
            let Some((left, right)) = node.children() else {
                continue;
            };

            for child in [left, right] {
                let Some(child_node) = self.get_node(child) else {
                    return violation(id, format!("child {} is not live", child));
                };
                if child_node.parent != Some(id) {
                    return violation(child, format!("parent is {:?}, expected {}", child_node.parent, id));
                }
                let widened = child_node
                    .variables_available_for_split
                    .iter()
                    .zip(&node.variables_available_for_split)
                    .any(|(&c, &p)| c && !p);
                if widened {
                    return violation(child, "availability mask is wider than the parent's".to_string());
                }
            }

            let (left_node, right_node) = (self.node(left), self.node(right));
            if left_node.start != node.start || right_node.start != node.start + left_node.length {
                return violation(
                    id,
                    format!(
                        "children views {:?} and {:?} do not tile {:?}",
                        left_node.view(),
                        right_node.view(),
                        node.view()
                    ),
                );
            }
            if left_node.length + right_node.length != node.length {
                return violation(
                    id,
                    format!(
                        "children lengths {} + {} differ from {}",
                        left_node.length, right_node.length, node.length
                    ),
                );
            }
            stack.push(right);
            stack.push(left);
        }

        let live = self.nodes.iter().flatten().count();
        if reachable != live {
            return violation(ROOT, format!("{} live nodes but {} reachable", live, reachable));
        }

        let mut seen = vec![false; self.indices.len()];
        for (position, &i) in self.indices.iter().enumerate() {
            if i >= seen.len() || seen[i] {
                let leaf = self.find_leaf_at_position(position);
                return violation(leaf, format!("observation index {} at position {} is invalid", i, position));
            }
            seen[i] = true;
        }

        Ok(())
    }

    fn find_leaf_at_position(&self, position: usize) -> NodeId {
        let mut id = ROOT;
        while let Some((left, right)) = self.node(id).children() {
            let left_node = self.node(left);
            id = if position < left_node.start + left_node.length {
                left
            } else {
                right
            };
        }
        id
    }

    /// Checks that every observation sits on the side of each rule it
    /// satisfies.
    pub fn validate_partition(&self, ctx: &TreeContext) -> Result<(), TreeError> {
        if ctx.num_observations() != self.num_observations() {
            return Err(TreeError::InvalidData(format!(
                "context has {} observations, tree has {}",
                ctx.num_observations(),
                self.num_observations()
            )));
        }
        for id in self.get_not_bottom_nodes() {
            let node = self.node(id);
            let (Some(rule), Some((left, right))) = (node.rule(), node.children()) else {
                continue;
            };
            let variable = rule.check(ctx)?;
            let variable_type = ctx.variable_type(variable);
            for (child, expected) in [(left, false), (right, true)] {
                for &i in self.observation_indices(child) {
                    if rule.goes_right(variable_type, ctx.data.x_at(i, variable)) != expected {
                        return Err(TreeError::InvariantViolation {
                            node: child,
                            detail: format!("observation {} is on the wrong side of node {}", i, id),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether [`Tree::validate`] passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Panics with the diagnostic when a debug build finds a broken invariant.
    #[inline]
    pub(crate) fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.validate() {
                panic!("{}", err);
            }
        }
    }

    /// Whether both trees have the same rules at the same positions, the
    /// same availability masks and bitwise identical leaf values.
    pub fn same_structure(&self, other: &Tree) -> bool {
        self.num_predictors == other.num_predictors && self.same_subtree(ROOT, other, ROOT)
    }

    fn same_subtree(&self, id: NodeId, other: &Tree, other_id: NodeId) -> bool {
        let (a, b) = (self.node(id), other.node(other_id));
        if a.variables_available_for_split != b.variables_available_for_split {
            return false;
        }
        match (a.kind, b.kind) {
            (
                NodeKind::Internal { rule, left, right },
                NodeKind::Internal {
                    rule: other_rule,
                    left: other_left,
                    right: other_right,
                },
            ) => {
                rule.equals(&other_rule)
                    && self.same_subtree(left, other, other_left)
                    && self.same_subtree(right, other, other_right)
            }
            (
                NodeKind::Leaf {
                    average,
                    num_effective_observations,
                },
                NodeKind::Leaf {
                    average: other_average,
                    num_effective_observations: other_count,
                },
            ) => {
                average.to_bits() == other_average.to_bits()
                    && num_effective_observations.to_bits() == other_count.to_bits()
            }
            _ => false,
        }
    }

    /// Recomputes every leaf average from `y`.
    pub fn set_node_averages(&mut self, ctx: &TreeContext, y: &[f64]) {
        self.set_averages(ctx, ROOT, y);
    }

    /// Regrows the tree from `prior`, starting from a single root.
    ///
    /// A node may only split on a variable that is still available and has
    /// split values left after its ancestors' rules. Leaf averages are left
    /// at zero.
    pub fn sample_from_prior<R, P>(&mut self, ctx: &TreeContext, rng: &mut R, prior: &P) -> Result<(), TreeError>
    where
        R: Rng + ?Sized,
        P: TreePrior,
    {
        if ctx.num_observations() != self.num_observations() || ctx.num_predictors() != self.num_predictors {
            return Err(TreeError::InvalidData(format!(
                "context is {} x {}, tree is {} x {}",
                ctx.num_observations(),
                ctx.num_predictors(),
                self.num_observations(),
                self.num_predictors
            )));
        }

        self.reset();
        self.grow_from_prior(ctx, rng, prior, ROOT, 0)?;

        debug!("sampled tree with {} leaves from the prior", self.get_num_bottom_nodes());
        Ok(())
    }

    fn grow_from_prior<R, P>(
        &mut self,
        ctx: &TreeContext,
        rng: &mut R,
        prior: &P,
        id: NodeId,
        depth: usize,
    ) -> Result<(), TreeError>
    where
        R: Rng + ?Sized,
        P: TreePrior,
    {
        let spaces = self.split_spaces(ctx, id);
        let eligible: Vec<usize> = spaces
            .iter()
            .enumerate()
            .filter_map(|(variable, space)| space.filter(SplitSpace::is_splittable).map(|_| variable))
            .collect();

        if eligible.is_empty() || !prior.sample_split_flag(rng, depth) {
            return Ok(());
        }

        let variable = prior.choose_variable(rng, &eligible);
        let Some(space) = spaces[variable] else {
            return Err(TreeError::InvalidRule(format!("variable {} is not eligible", variable)));
        };
        let (rule, exhausted_left, exhausted_right) = space.draw(rng, variable);
        let (left, right) = self.split_structure(ctx, id, rule, exhausted_left, exhausted_right)?;

        self.grow_from_prior(ctx, rng, prior, left, depth + 1)?;
        self.grow_from_prior(ctx, rng, prior, right, depth + 1)
    }

    /// Split values of every variable that still reach node `id`, `None` for
    /// variables marked unavailable.
    fn split_spaces(&self, ctx: &TreeContext, id: NodeId) -> Vec<Option<SplitSpace>> {
        let node = self.node(id);
        let mut spaces: Vec<Option<SplitSpace>> = (0..self.num_predictors)
            .map(|variable| {
                if !node.variables_available_for_split[variable] {
                    return None;
                }
                let num_cuts = ctx.cut_points.num_cuts(variable);
                Some(match ctx.variable_type(variable) {
                    VariableType::Ordinal => SplitSpace::Ordinal {
                        lo: 0,
                        hi: num_cuts as i64 - 1,
                    },
                    VariableType::Categorical => SplitSpace::Categorical {
                        available: match num_cuts.min(MAX_NUM_CATEGORIES) {
                            MAX_NUM_CATEGORIES => u32::MAX,
                            c => (1u32 << c) - 1,
                        },
                    },
                })
            })
            .collect();

        let mut child = id;
        while let Some(parent) = self.node(child).parent {
            let parent_node = self.node(parent);
            if let Some(rule) = parent_node.rule() {
                if let Some(space) = rule.variable().and_then(|v| spaces[v].as_mut()) {
                    space.restrict(rule, parent_node.right_child() == Some(child));
                }
            }
            child = parent;
        }
        spaces
    }

    /// Draws every leaf value from `model` and writes the fits.
    ///
    /// Returns the draws in leaf enumeration order. Test fits are written
    /// when both a buffer and a test matrix are present. Fails with
    /// [`TreeError::InvalidData`] when a buffer does not have one entry per
    /// observation or test row.
    pub fn sample_averages_and_set_fits<R, M>(
        &mut self,
        ctx: &TreeContext,
        rng: &mut R,
        model: &M,
        residual_variance: f64,
        training_fits: &mut [f64],
        test_fits: Option<&mut [f64]>,
    ) -> Result<Vec<f64>, TreeError>
    where
        R: Rng + ?Sized,
        M: EndNodeModel,
    {
        self.check_fit_lengths(ctx, training_fits, test_fits.as_deref())?;
        let leaves = self.get_and_enumerate_bottom_nodes();
        let draws: Vec<f64> = leaves
            .iter()
            .map(|&leaf| {
                self.draw_from_posterior(leaf, rng, model, residual_variance)
                    .unwrap_or_default()
            })
            .collect();

        self.write_fits(ctx, &leaves, &draws, training_fits, test_fits);
        Ok(draws)
    }

    /// Writes fits from leaf values given in enumeration order.
    pub fn set_current_fits_from_averages(
        &mut self,
        ctx: &TreeContext,
        posterior_predictions: &[f64],
        training_fits: &mut [f64],
        test_fits: Option<&mut [f64]>,
    ) -> Result<(), TreeError> {
        self.check_fit_lengths(ctx, training_fits, test_fits.as_deref())?;
        let leaves = self.get_and_enumerate_bottom_nodes();
        if leaves.len() != posterior_predictions.len() {
            return Err(TreeError::LeafCountMismatch {
                expected: leaves.len(),
                found: posterior_predictions.len(),
            });
        }
        self.write_fits(ctx, &leaves, posterior_predictions, training_fits, test_fits);
        Ok(())
    }

    fn check_fit_lengths(
        &self,
        ctx: &TreeContext,
        training_fits: &[f64],
        test_fits: Option<&[f64]>,
    ) -> Result<(), TreeError> {
        if training_fits.len() != self.num_observations() {
            return Err(TreeError::InvalidData(format!(
                "{} training fits for {} observations",
                training_fits.len(),
                self.num_observations()
            )));
        }
        if let (Some(test_fits), Some(x_test)) = (test_fits, ctx.data.x_test()) {
            if test_fits.len() != x_test.nrows() {
                return Err(TreeError::InvalidData(format!(
                    "{} test fits for {} test rows",
                    test_fits.len(),
                    x_test.nrows()
                )));
            }
        }
        Ok(())
    }

    fn write_fits(
        &self,
        ctx: &TreeContext,
        leaves: &[NodeId],
        values: &[f64],
        training_fits: &mut [f64],
        test_fits: Option<&mut [f64]>,
    ) {
        for (&leaf, &value) in leaves.iter().zip(values) {
            self.set_predictions(leaf, training_fits, value);
        }

        if let (Some(test_fits), Some(x_test)) = (test_fits, ctx.data.x_test()) {
            let variable_types = ctx.data.variable_types();
            for (fit, row) in test_fits.iter_mut().zip(x_test.rows()) {
                let leaf = self.find_bottom_node(variable_types, row);
                *fit = self
                    .node(leaf)
                    .enumeration_index
                    .and_then(|index| values.get(index).copied())
                    .unwrap_or_default();
            }
        }
    }

    /// Leaf values in enumeration order, read back from per-observation fits.
    ///
    /// Each leaf takes the fit of its first observation, empty leaves zero.
    pub fn recover_averages_from_fits(&self, tree_fits: &[f64]) -> Vec<f64> {
        self.get_bottom_nodes()
            .into_iter()
            .map(|leaf| {
                self.observation_indices(leaf)
                    .first()
                    .map_or(0.0, |&i| tree_fits[i])
            })
            .collect()
    }

    /// Moves every ordinal rule to the cut point of the new grid in `ctx`
    /// nearest to its value under `old_cut_points`, re-partitions, and
    /// collapses subtrees left without observations.
    ///
    /// `posterior_predictions` holds leaf values in enumeration order and is
    /// rewritten to match the collapsed tree.
    pub fn map_old_cut_points_onto_new(
        &mut self,
        ctx: &TreeContext,
        old_cut_points: &CutPoints,
        posterior_predictions: &mut Vec<f64>,
    ) -> Result<(), TreeError> {
        let num_leaves = self.get_num_bottom_nodes();
        if num_leaves != posterior_predictions.len() {
            return Err(TreeError::LeafCountMismatch {
                expected: num_leaves,
                found: posterior_predictions.len(),
            });
        }

        for id in self.get_not_bottom_nodes() {
            let Some(rule) = self.node(id).rule().copied() else {
                continue;
            };
            let Some(variable) = rule.variable() else {
                return Err(TreeError::InvalidRule(format!("node {} has an unset rule", id)));
            };
            if ctx.variable_type(variable) != VariableType::Ordinal {
                continue;
            }

            let old_value = old_cut_points
                .get(variable)
                .get(rule.split_index() as usize)
                .copied()
                .ok_or_else(|| {
                    TreeError::InvalidRule(format!(
                        "split index {} not in the old grid of variable {}",
                        rule.split_index(),
                        variable
                    ))
                })?;
            let new_index = ctx.cut_points.nearest_index(variable, old_value).ok_or_else(|| {
                TreeError::InvalidRule(format!("variable {} has no cut points in the new grid", variable))
            })?;
            if let Some(rule) = self.rule_mut(id) {
                *rule = Rule::ordinal(variable, new_index);
            }
        }

        self.add_observations_to_children(ctx, ROOT, None);
        self.collapse_empty_nodes(posterior_predictions)?;

        debug!(
            "remapped tree onto new cut points, {} of {} leaves remain",
            posterior_predictions.len(),
            num_leaves
        );
        Ok(())
    }

    /// Removes every split that leaves one side without observations.
    ///
    /// A split whose empty side faces a leaf becomes that leaf; otherwise the
    /// non-empty subtree takes the split's place. `posterior_predictions`
    /// follows the leaves it was aligned with.
    pub fn collapse_empty_nodes(&mut self, posterior_predictions: &mut Vec<f64>) -> Result<(), TreeError> {
        let leaves = self.get_bottom_nodes();
        if leaves.len() != posterior_predictions.len() {
            return Err(TreeError::LeafCountMismatch {
                expected: leaves.len(),
                found: posterior_predictions.len(),
            });
        }

        let mut values = vec![None; self.nodes.len()];
        for (&leaf, &value) in leaves.iter().zip(posterior_predictions.iter()) {
            values[leaf] = Some(value);
        }

        let num_collapsed = self.collapse_below(ROOT, &mut values);

        *posterior_predictions = self
            .get_bottom_nodes()
            .into_iter()
            .map(|leaf| values[leaf].unwrap_or_default())
            .collect();

        if num_collapsed > 0 {
            debug!("collapsed {} empty splits", num_collapsed);
        }
        self.debug_check();
        Ok(())
    }

    fn collapse_below(&mut self, id: NodeId, values: &mut [Option<f64>]) -> usize {
        let Some((left, right)) = self.node(id).children() else {
            return 0;
        };
        let mut num_collapsed = self.collapse_below(left, values) + self.collapse_below(right, values);

        let (keep, drop) = if self.node(left).length == 0 {
            (right, left)
        } else if self.node(right).length == 0 {
            (left, right)
        } else {
            return num_collapsed;
        };

        let kept = self.release(keep);
        self.release_subtree(drop);
        if let Some((grand_left, grand_right)) = kept.children() {
            self.node_mut(grand_left).parent = Some(id);
            self.node_mut(grand_right).parent = Some(id);
        }
        let node = self.node_mut(id);
        node.kind = kept.kind;
        node.enumeration_index = None;
        values[id] = values[keep];

        num_collapsed += 1;
        num_collapsed
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            let mask: String = node
                .variables_available_for_split
                .iter()
                .map(|&available| if available { '1' } else { '0' })
                .collect();
            write!(
                f,
                "{:indent$}{} {}{}{} {} ",
                "",
                node.length,
                if node.is_top() { 'T' } else { '-' },
                if node.is_bottom() { 'B' } else { '-' },
                if self.children_are_bottom(id) { 'N' } else { '-' },
                mask,
                indent = 2 * depth
            )?;
            match node.kind {
                NodeKind::Internal { rule, left, right } => {
                    writeln!(f, "var: {} payload: {:#x}", rule.variable_index, rule.payload())?;
                    stack.push((right, depth + 1));
                    stack.push((left, depth + 1));
                }
                NodeKind::Leaf {
                    average,
                    num_effective_observations,
                } => writeln!(f, "avg: {:.6} n: {}", average, num_effective_observations)?,
            }
        }
        Ok(())
    }
}
