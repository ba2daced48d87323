//! Compact snapshots of trees kept as posterior samples.
//!
//! A [`SavedTree`] holds the topology, rules and one value per leaf of a live
//! [`Tree`], and nothing of its working state. It is built once and only
//! read afterwards, for prediction and persistence.

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::data::{VariableType, XInt};
use crate::errors::TreeError;
use crate::node::{NodeId, NodeKind};
use crate::rule::Rule;
use crate::serialize::{
    log_read_failure, ByteReader, ByteWriter, FORMAT_VERSION, INTERNAL_FLAG, LEAF_FLAG, SAVED_TREE_TAG,
};
use crate::tree::{Tree, ROOT};

/// Node of a [`SavedTree`]. Children are positions in the node list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SavedNode {
    /// Split node.
    Internal {
        /// Split predicate.
        rule: Rule,
        /// Position of the left child.
        left: usize,
        /// Position of the right child.
        right: usize,
    },
    /// Terminal node.
    Leaf {
        /// Prediction emitted for observations reaching the leaf.
        value: f64,
    },
}

/// Immutable snapshot of a tree's topology and leaf values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTree {
    nodes: Vec<SavedNode>,
}

impl SavedTree {
    /// Copies `tree`, taking each leaf's value from the fit of its first
    /// observation in `tree_fits`. Empty leaves get zero.
    pub fn copy_structure_from(tree: &Tree, tree_fits: &[f64]) -> Self {
        let mut nodes = Vec::with_capacity(tree.nodes.len());
        copy_node(tree, ROOT, &mut nodes, &mut |leaf| {
            tree.observation_indices(leaf)
                .first()
                .map_or(0.0, |&i| tree_fits[i])
        });
        Self { nodes }
    }

    /// Copies `tree` with leaf values given in leaf enumeration order.
    pub fn from_leaf_values(tree: &Tree, values: &[f64]) -> Result<Self, TreeError> {
        let num_leaves = tree.get_num_bottom_nodes();
        if num_leaves != values.len() {
            return Err(TreeError::LeafCountMismatch {
                expected: num_leaves,
                found: values.len(),
            });
        }

        let mut nodes = Vec::with_capacity(tree.nodes.len());
        let mut next = values.iter().copied();
        copy_node(tree, ROOT, &mut nodes, &mut |_| next.next().unwrap_or_default());
        Ok(Self { nodes })
    }

    /// Nodes in pre-order, the root first.
    pub fn nodes(&self) -> &[SavedNode] {
        &self.nodes
    }

    /// Number of leaves.
    pub fn num_bottom_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, SavedNode::Leaf { .. }))
            .count()
    }

    /// Leaf values left to right.
    pub fn leaf_values(&self) -> Vec<f64> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                SavedNode::Leaf { value } => Some(*value),
                SavedNode::Internal { .. } => None,
            })
            .collect()
    }

    /// Value of the leaf reached by one row of codes.
    ///
    /// # Panics
    ///
    /// Panics if a rule names a variable outside `row` or `variable_types`.
    /// [`SavedTree::get_predictions`] checks this before descending.
    pub fn predict_row(&self, variable_types: &[VariableType], row: ArrayView1<XInt>) -> f64 {
        let mut position = 0;
        loop {
            match self.nodes[position] {
                SavedNode::Leaf { value } => return value,
                SavedNode::Internal { rule, left, right } => {
                    position = if rule.goes_right_row(variable_types, row) {
                        right
                    } else {
                        left
                    };
                }
            }
        }
    }

    /// Writes the prediction for every row of `x_test` into `result`.
    pub fn get_predictions(
        &self,
        variable_types: &[VariableType],
        x_test: ArrayView2<XInt>,
        result: &mut [f64],
    ) -> Result<(), TreeError> {
        if result.len() != x_test.nrows() {
            return Err(TreeError::InvalidData(format!(
                "{} test rows but room for {} predictions",
                x_test.nrows(),
                result.len()
            )));
        }
        if x_test.ncols() != variable_types.len() {
            return Err(TreeError::InvalidData(format!(
                "test matrix has {} columns, {} variable types given",
                x_test.ncols(),
                variable_types.len()
            )));
        }
        self.check_rules(variable_types.len())?;

        for (prediction, row) in result.iter_mut().zip(x_test.rows()) {
            *prediction = self.predict_row(variable_types, row);
        }
        Ok(())
    }

    fn check_rules(&self, num_predictors: usize) -> Result<(), TreeError> {
        for node in &self.nodes {
            if let SavedNode::Internal { rule, .. } = node {
                if rule.variable().map_or(true, |v| v >= num_predictors) {
                    return Err(TreeError::InvalidRule(format!(
                        "variable {} with {} predictors",
                        rule.variable_index, num_predictors
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks that the node list is a pre-order binary tree.
    fn check_topology(&self) -> Result<(), TreeError> {
        let mut next = 0;
        let mut stack = vec![0usize];
        while let Some(position) = stack.pop() {
            if position != next {
                return Err(TreeError::UnableToRead(format!("node {} is out of pre-order", position)));
            }
            next += 1;
            match self.nodes.get(position) {
                None => return Err(TreeError::UnableToRead(format!("node {} does not exist", position))),
                Some(SavedNode::Leaf { .. }) => {}
                Some(SavedNode::Internal { left, right, .. }) => {
                    if *left != position + 1 {
                        return Err(TreeError::UnableToRead(format!(
                            "left child of node {} is {}",
                            position, left
                        )));
                    }
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        if next != self.nodes.len() {
            return Err(TreeError::TrailingNodes);
        }
        Ok(())
    }

    /// Number of bytes [`SavedTree::serialize`] writes.
    pub fn get_serialized_length(&self) -> usize {
        // every node is a flag plus eight bytes
        12 + 9 * self.nodes.len()
    }

    /// Writes the snapshot into `buffer` and returns the number of bytes used.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, TreeError> {
        let needed = self.get_serialized_length();
        if buffer.len() < needed {
            return Err(TreeError::BufferTooSmall {
                needed,
                available: buffer.len(),
            });
        }

        let mut writer = ByteWriter::new(buffer);
        writer.put(&SAVED_TREE_TAG)?;
        writer.put_u32(FORMAT_VERSION)?;
        writer.put_count(self.nodes.len())?;
        for node in &self.nodes {
            match node {
                SavedNode::Internal { rule, .. } => {
                    writer.put_u8(INTERNAL_FLAG)?;
                    writer.put_rule(rule)?;
                }
                SavedNode::Leaf { value } => {
                    writer.put_u8(LEAF_FLAG)?;
                    writer.put_f64(*value)?;
                }
            }
        }
        Ok(writer.offset())
    }

    /// Reads a snapshot and returns it with the number of bytes consumed.
    pub fn deserialize(buffer: &[u8]) -> Result<(SavedTree, usize), TreeError> {
        log_read_failure("saved tree", read_saved_tree(buffer))
    }

    /// Export the snapshot as a JSON string.
    pub fn json_dump(&self) -> Result<String, TreeError> {
        serde_json::to_string(self).map_err(|e| TreeError::UnableToWrite(e.to_string()))
    }

    /// Load a snapshot from a JSON string.
    ///
    /// * `json_str` - String produced by [`SavedTree::json_dump`].
    pub fn from_json(json_str: &str) -> Result<Self, TreeError> {
        let saved = serde_json::from_str::<SavedTree>(json_str).map_err(|e| TreeError::UnableToRead(e.to_string()));
        log_read_failure("saved tree", saved.and_then(|saved| saved.check_topology().map(|_| saved)))
    }
}

fn copy_node<F>(tree: &Tree, id: NodeId, nodes: &mut Vec<SavedNode>, leaf_value: &mut F)
where
    F: FnMut(NodeId) -> f64,
{
    // (node, parent position and whether it is the right child)
    let mut stack = vec![(id, None)];
    while let Some((id, parent)) = stack.pop() {
        let position = nodes.len();
        match tree.node(id).kind {
            NodeKind::Leaf { .. } => nodes.push(SavedNode::Leaf { value: leaf_value(id) }),
            NodeKind::Internal { rule, left, right } => {
                nodes.push(SavedNode::Internal {
                    rule,
                    left: position,
                    right: position,
                });
                stack.push((right, Some((position, true))));
                stack.push((left, Some((position, false))));
            }
        }
        if let Some((parent, is_right)) = parent {
            if let SavedNode::Internal { left, right, .. } = &mut nodes[parent] {
                if is_right {
                    *right = position;
                } else {
                    *left = position;
                }
            }
        }
    }
}

fn read_saved_tree(buffer: &[u8]) -> Result<(SavedTree, usize), TreeError> {
    let mut reader = ByteReader::new(buffer);
    reader.header(SAVED_TREE_TAG)?;
    let num_nodes = reader.u32()? as usize;

    let mut nodes = Vec::new();
    // (parent, is right child) of every node still to be read
    let mut pending: Vec<Option<(usize, bool)>> = vec![None];
    while let Some(slot) = pending.pop() {
        let position = read_saved_node(&mut reader, &mut nodes, num_nodes)?;
        if let Some((parent, is_right)) = slot {
            if let SavedNode::Internal { left, right, .. } = &mut nodes[parent] {
                if is_right {
                    *right = position;
                } else {
                    *left = position;
                }
            }
        }
        if let SavedNode::Internal { .. } = nodes[position] {
            pending.push(Some((position, true)));
            pending.push(Some((position, false)));
        }
    }
    if nodes.len() != num_nodes {
        return Err(TreeError::TrailingNodes);
    }
    Ok((SavedTree { nodes }, reader.offset()))
}

/// Reads one node record. Child positions of an internal node are patched in
/// by the caller.
fn read_saved_node(reader: &mut ByteReader, nodes: &mut Vec<SavedNode>, num_nodes: usize) -> Result<usize, TreeError> {
    if nodes.len() >= num_nodes {
        return Err(TreeError::TrailingNodes);
    }

    let offset = reader.offset();
    let position = nodes.len();
    match reader.u8()? {
        LEAF_FLAG => nodes.push(SavedNode::Leaf { value: reader.f64()? }),
        INTERNAL_FLAG => {
            let rule = reader.rule()?;
            if !rule.is_valid() {
                return Err(TreeError::MalformedNode {
                    offset,
                    flag: INTERNAL_FLAG,
                });
            }
            nodes.push(SavedNode::Internal {
                rule,
                left: position,
                right: position,
            });
        }
        flag => return Err(TreeError::MalformedNode { offset, flag }),
    }
    Ok(position)
}
