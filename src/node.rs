//! Nodes of a recursive-partition tree and the structural operations that
//! act on a single node: split, merge, re-partitioning and leaf averages.
//!
//! Nodes live in an arena owned by the [`Tree`] and are addressed by
//! [`NodeId`]. A node is either internal (a rule and two children) or a leaf
//! (a running average and effective observation count). Every node also
//! carries its view `(start, length)` into the tree's shared index buffer and
//! the mask of variables still available for splitting along its branch.

use log::debug;
use ndarray::ArrayView1;
use rand::Rng;

use crate::context::TreeContext;
use crate::data::{VariableType, XInt};
use crate::errors::TreeError;
use crate::math::{
    compute_indexed_mean, compute_indexed_variance_for_known_mean, compute_indexed_weighted_mean,
    compute_indexed_weighted_variance_for_known_mean,
};
use crate::ops::EndNodeModel;
use crate::partition::partition;
use crate::rule::Rule;
use crate::tree::{Tree, ROOT};

/// Index of a node in its tree's arena.
pub type NodeId = usize;

/// Payload of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Split node owning a rule and two children.
    Internal {
        /// Split predicate.
        rule: Rule,
        /// Child receiving observations for which the rule is false.
        left: NodeId,
        /// Child receiving observations for which the rule is true.
        right: NodeId,
    },
    /// Terminal node.
    Leaf {
        /// Mean response over the node's observations.
        average: f64,
        /// Observation count, or total weight when weights are in use.
        num_effective_observations: f64,
    },
}

/// A node of a [`Tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) variables_available_for_split: Vec<bool>,
    pub(crate) start: usize,
    pub(crate) length: usize,
    pub(crate) enumeration_index: Option<usize>,
}

impl Node {
    pub(crate) fn leaf(
        parent: Option<NodeId>,
        variables_available_for_split: Vec<bool>,
        start: usize,
        length: usize,
    ) -> Self {
        Self {
            parent,
            kind: NodeKind::Leaf {
                average: 0.0,
                num_effective_observations: 0.0,
            },
            variables_available_for_split,
            start,
            length,
            enumeration_index: None,
        }
    }

    /// Parent of this node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Internal or leaf payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this node is the root.
    #[inline]
    pub fn is_top(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether this node is a leaf.
    #[inline]
    pub fn is_bottom(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Both children of an internal node.
    #[inline]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Internal { left, right, .. } => Some((left, right)),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Left child of an internal node.
    pub fn left_child(&self) -> Option<NodeId> {
        self.children().map(|(left, _)| left)
    }

    /// Right child of an internal node.
    pub fn right_child(&self) -> Option<NodeId> {
        self.children().map(|(_, right)| right)
    }

    /// Rule of an internal node.
    pub fn rule(&self) -> Option<&Rule> {
        match &self.kind {
            NodeKind::Internal { rule, .. } => Some(rule),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Average of a leaf.
    pub fn average(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Leaf { average, .. } => Some(average),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Effective observation count of a leaf.
    pub fn num_effective_observations(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Leaf {
                num_effective_observations,
                ..
            } => Some(num_effective_observations),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Number of observations in this node's view.
    #[inline]
    pub fn num_observations(&self) -> usize {
        self.length
    }

    /// `(start, length)` of this node's view into the index buffer.
    #[inline]
    pub fn view(&self) -> (usize, usize) {
        (self.start, self.length)
    }

    /// Left-to-right position among the leaves, set by enumeration.
    pub fn enumeration_index(&self) -> Option<usize> {
        self.enumeration_index
    }

    /// Per-variable availability along this node's branch.
    pub fn variables_available_for_split(&self) -> &[bool] {
        &self.variables_available_for_split
    }

    /// Number of variables still available for splitting.
    pub fn get_num_variables_available_for_split(&self) -> usize {
        self.variables_available_for_split.iter().filter(|&&v| v).count()
    }
}

/// Children detached by [`Tree::orphan_children`].
///
/// Merging leaves the index buffer untouched, so handing this back to
/// [`Tree::restore_children`] undoes the merge without re-partitioning.
#[derive(Debug, Clone)]
pub struct OrphanedChildren {
    node: NodeId,
    rule: Rule,
    left: Node,
    right: Node,
}

impl OrphanedChildren {
    /// Node the children were detached from.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Rule the node carried before the merge.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }
}

impl Tree {
    /// Node `id`, `None` if the slot is empty or out of range.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    /// Node `id`.
    ///
    /// Panics if `id` does not address a live node.
    pub fn node(&self, id: NodeId) -> &Node {
        match self.get_node(id) {
            Some(node) => node,
            None => panic!("node {} is not part of the tree", id),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("node {} is not part of the tree", id),
        }
    }

    fn live_node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.get_node(id).ok_or(TreeError::InvalidNodeIndex(id))
    }

    /// Whether node `id` is internal with two leaf children.
    pub fn children_are_bottom(&self, id: NodeId) -> bool {
        match self.node(id).children() {
            Some((left, right)) => self.node(left).is_bottom() && self.node(right).is_bottom(),
            None => false,
        }
    }

    /// Mutable rule of an internal node, used to stage and revert rule changes.
    pub fn rule_mut(&mut self, id: NodeId) -> Option<&mut Rule> {
        match &mut self.node_mut(id).kind {
            NodeKind::Internal { rule, .. } => Some(rule),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Observation indices in node `id`'s view.
    pub fn observation_indices(&self, id: NodeId) -> &[usize] {
        let node = self.node(id);
        &self.indices[node.start..node.start + node.length]
    }

    /// Gathers `v` over the observations of node `id`.
    pub fn subset_vector<T: Copy>(&self, id: NodeId, v: &[T]) -> Vec<T> {
        self.observation_indices(id).iter().map(|&i| v[i]).collect()
    }

    /// Computes the depth of node `id`, the root being at depth 0.
    pub fn get_depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.node(id);
        while let Some(parent) = current.parent {
            depth += 1;
            current = self.node(parent);
        }
        depth
    }

    /// Height of the subtree below node `id`.
    pub fn get_depth_below(&self, id: NodeId) -> usize {
        match self.node(id).children() {
            None => 0,
            Some((left, right)) => 1 + self.get_depth_below(left).max(self.get_depth_below(right)),
        }
    }

    /// Number of nodes strictly below node `id`.
    pub fn get_num_nodes_below(&self, id: NodeId) -> usize {
        match self.node(id).children() {
            None => 0,
            Some((left, right)) => 2 + self.get_num_nodes_below(left) + self.get_num_nodes_below(right),
        }
    }

    /// Leaf reached by an observation given as one row of codes.
    pub fn find_bottom_node(&self, variable_types: &[VariableType], row: ArrayView1<XInt>) -> NodeId {
        let mut id = ROOT;
        while let NodeKind::Internal { rule, left, right } = self.node(id).kind {
            id = if rule.goes_right_row(variable_types, row) {
                right
            } else {
                left
            };
        }
        id
    }

    /// Splits leaf `id` on `rule` and sets both children's averages from `y`.
    ///
    /// `exhausted_left` and `exhausted_right` remove the split variable from
    /// the respective child's availability mask.
    pub fn split(
        &mut self,
        ctx: &TreeContext,
        id: NodeId,
        rule: Rule,
        y: &[f64],
        exhausted_left: bool,
        exhausted_right: bool,
    ) -> Result<(NodeId, NodeId), TreeError> {
        let children = self.attach_children(ctx, id, rule, exhausted_left, exhausted_right)?;
        self.add_observations_to_children(ctx, id, Some(y));

        debug!(
            "split node {} on variable {} ({} | {})",
            id,
            rule.variable_index,
            self.node(children.0).length,
            self.node(children.1).length
        );
        self.debug_check();
        Ok(children)
    }

    /// Splits leaf `id` on `rule` without a response.
    ///
    /// Children get a zero average and their plain observation count.
    pub fn split_structure(
        &mut self,
        ctx: &TreeContext,
        id: NodeId,
        rule: Rule,
        exhausted_left: bool,
        exhausted_right: bool,
    ) -> Result<(NodeId, NodeId), TreeError> {
        let (left, right) = self.attach_children(ctx, id, rule, exhausted_left, exhausted_right)?;
        self.add_observations_to_children(ctx, id, None);
        for child in [left, right] {
            let node = self.node_mut(child);
            node.kind = NodeKind::Leaf {
                average: 0.0,
                num_effective_observations: node.length as f64,
            };
        }

        self.debug_check();
        Ok((left, right))
    }

    fn attach_children(
        &mut self,
        ctx: &TreeContext,
        id: NodeId,
        rule: Rule,
        exhausted_left: bool,
        exhausted_right: bool,
    ) -> Result<(NodeId, NodeId), TreeError> {
        let variable = rule.check(ctx)?;
        let node = self.live_node(id)?;
        if !node.is_bottom() {
            return Err(TreeError::NonLeafSplit(id));
        }

        let mut left_mask = node.variables_available_for_split.clone();
        let mut right_mask = left_mask.clone();
        if exhausted_left {
            left_mask[variable] = false;
        }
        if exhausted_right {
            right_mask[variable] = false;
        }
        let (start, length) = node.view();

        let left = self.alloc(Node::leaf(Some(id), left_mask, start, 0));
        let right = self.alloc(Node::leaf(Some(id), right_mask, start, length));

        let node = self.node_mut(id);
        node.kind = NodeKind::Internal { rule, left, right };
        node.enumeration_index = None;

        Ok((left, right))
    }

    /// Collapses the two leaf children of `id` back into a leaf.
    ///
    /// The new average is the count-weighted combination of the children's
    /// stored averages; no response values are read.
    pub fn orphan_children(&mut self, id: NodeId) -> Result<OrphanedChildren, TreeError> {
        let node = self.live_node(id)?;
        let NodeKind::Internal { rule, left, right } = node.kind else {
            return Err(TreeError::NotNoGrandNode(id));
        };
        let (
            NodeKind::Leaf {
                average: left_average,
                num_effective_observations: left_count,
            },
            NodeKind::Leaf {
                average: right_average,
                num_effective_observations: right_count,
            },
        ) = (self.node(left).kind, self.node(right).kind)
        else {
            return Err(TreeError::NotNoGrandNode(id));
        };

        let count = left_count + right_count;
        let average = if count > 0.0 {
            left_average * (left_count / count) + right_average * (right_count / count)
        } else {
            0.0
        };

        let left = self.release(left);
        let right = self.release(right);
        let node = self.node_mut(id);
        node.kind = NodeKind::Leaf {
            average,
            num_effective_observations: count,
        };
        node.enumeration_index = None;

        debug!("merged children of node {}", id);
        self.debug_check();
        Ok(OrphanedChildren {
            node: id,
            rule,
            left,
            right,
        })
    }

    /// Reattaches children detached by [`Tree::orphan_children`].
    pub fn restore_children(&mut self, orphaned: OrphanedChildren) -> Result<(NodeId, NodeId), TreeError> {
        let id = orphaned.node;
        let node = self.live_node(id)?;
        if !node.is_bottom() {
            return Err(TreeError::NonLeafSplit(id));
        }
        let (start, length) = node.view();
        if orphaned.left.start != start
            || orphaned.right.start != start + orphaned.left.length
            || orphaned.left.length + orphaned.right.length != length
        {
            return Err(TreeError::InvariantViolation {
                node: id,
                detail: "orphaned children no longer match the node's view".to_string(),
            });
        }

        let left = self.alloc(orphaned.left);
        let right = self.alloc(orphaned.right);
        self.node_mut(left).parent = Some(id);
        self.node_mut(right).parent = Some(id);
        let node = self.node_mut(id);
        node.kind = NodeKind::Internal {
            rule: orphaned.rule,
            left,
            right,
        };
        node.enumeration_index = None;

        self.debug_check();
        Ok((left, right))
    }

    /// Re-partitions the subtree below `id` top-down.
    ///
    /// Leaf averages are recomputed from `y` when given, otherwise left as
    /// they are. The root uses the dense-range kernel, every other node the
    /// indices kernel.
    pub fn add_observations_to_children(&mut self, ctx: &TreeContext, id: NodeId, y: Option<&[f64]>) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            let (start, length, is_top, kind) = (node.start, node.length, node.is_top(), node.kind);

            match kind {
                NodeKind::Leaf { .. } => {
                    if let Some(y) = y {
                        self.set_average(ctx, id, y);
                    }
                }
                NodeKind::Internal { rule, left, right } => {
                    let num_left = if length > 0 {
                        partition(ctx, &rule, &mut self.indices[start..start + length], is_top)
                    } else {
                        0
                    };

                    let left_node = self.node_mut(left);
                    left_node.start = start;
                    left_node.length = num_left;
                    let right_node = self.node_mut(right);
                    right_node.start = start + num_left;
                    right_node.length = length - num_left;

                    stack.push(right);
                    stack.push(left);
                }
            }
        }
    }

    fn set_average(&mut self, ctx: &TreeContext, id: NodeId, y: &[f64]) {
        let node = self.node(id);
        let view = &self.indices[node.start..node.start + node.length];
        let (average, num_effective_observations) = match ctx.weights() {
            None => (compute_indexed_mean(ctx.thread_pool, y, view), view.len() as f64),
            Some(weights) => compute_indexed_weighted_mean(ctx.thread_pool, y, view, weights),
        };

        self.node_mut(id).kind = NodeKind::Leaf {
            average,
            num_effective_observations,
        };
    }

    /// Recomputes the average of every leaf below (and including) `id`.
    pub fn set_averages(&mut self, ctx: &TreeContext, id: NodeId, y: &[f64]) {
        match self.node(id).children() {
            None => self.set_average(ctx, id, y),
            Some((left, right)) => {
                self.set_averages(ctx, left, y);
                self.set_averages(ctx, right, y);
            }
        }
    }

    /// Sum of squared deviations of `y` from the average of leaf `id`.
    pub fn compute_variance(&self, ctx: &TreeContext, id: NodeId, y: &[f64]) -> Option<f64> {
        let average = self.node(id).average()?;
        let view = self.observation_indices(id);
        Some(match ctx.weights() {
            None => compute_indexed_variance_for_known_mean(ctx.thread_pool, y, view, average),
            Some(weights) => {
                compute_indexed_weighted_variance_for_known_mean(ctx.thread_pool, y, view, weights, average)
            }
        })
    }

    /// Draws the value of leaf `id` from `model`, zero for an empty leaf.
    pub fn draw_from_posterior<R, M>(
        &self,
        id: NodeId,
        rng: &mut R,
        model: &M,
        residual_variance: f64,
    ) -> Option<f64>
    where
        R: Rng + ?Sized,
        M: EndNodeModel,
    {
        let node = self.node(id);
        let NodeKind::Leaf {
            average,
            num_effective_observations,
        } = node.kind
        else {
            return None;
        };
        if node.length == 0 {
            return Some(0.0);
        }
        Some(model.draw_from_posterior(rng, average, num_effective_observations, residual_variance))
    }

    /// Writes `prediction` into `y_hat` for every observation of node `id`.
    pub fn set_predictions(&self, id: NodeId, y_hat: &mut [f64], prediction: f64) {
        for &i in self.observation_indices(id) {
            y_hat[i] = prediction;
        }
    }

    pub(crate) fn count_variable_uses_below(&self, id: NodeId, variable_counts: &mut [u32]) {
        if let NodeKind::Internal { rule, left, right } = self.node(id).kind {
            if let Some(variable) = rule.variable() {
                variable_counts[variable] += 1;
            }
            self.count_variable_uses_below(left, variable_counts);
            self.count_variable_uses_below(right, variable_counts);
        }
    }
}
