//! Binary persistence of trees into caller-supplied buffers.
//!
//! Every stream starts with a 4-byte tag and a `u32` format version so that
//! a reader rejects foreign or newer streams before decoding any node. All
//! numbers are little-endian and nodes are written in pre-order.
//!
//! A [`Tree`] stream does not carry observation indices. Reading it with a
//! context re-derives every view by partitioning the training data again.

use log::warn;

use crate::context::TreeContext;
use crate::errors::TreeError;
use crate::node::{Node, NodeId, NodeKind};
use crate::rule::Rule;
use crate::tree::{Tree, ROOT};

/// Tag opening a [`Tree`] stream.
pub const TREE_TAG: [u8; 4] = *b"BTRE";
/// Tag opening a [`crate::saved_tree::SavedTree`] stream.
pub const SAVED_TREE_TAG: [u8; 4] = *b"BSVT";
/// Current format version of both streams.
pub const FORMAT_VERSION: u32 = 1;

pub(crate) const LEAF_FLAG: u8 = 0;
pub(crate) const INTERNAL_FLAG: u8 = 1;

/// Sequential little-endian writer over a fixed buffer.
pub(crate) struct ByteWriter<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> ByteWriter<'a> {
    pub(crate) fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn put(&mut self, bytes: &[u8]) -> Result<(), TreeError> {
        let end = self.offset + bytes.len();
        let available = self.buffer.len();
        let target = self.buffer.get_mut(self.offset..end).ok_or(TreeError::BufferTooSmall {
            needed: end,
            available,
        })?;
        target.copy_from_slice(bytes);
        self.offset = end;
        Ok(())
    }

    pub(crate) fn put_u8(&mut self, value: u8) -> Result<(), TreeError> {
        self.put(&[value])
    }

    pub(crate) fn put_u32(&mut self, value: u32) -> Result<(), TreeError> {
        self.put(&value.to_le_bytes())
    }

    pub(crate) fn put_i32(&mut self, value: i32) -> Result<(), TreeError> {
        self.put(&value.to_le_bytes())
    }

    pub(crate) fn put_f64(&mut self, value: f64) -> Result<(), TreeError> {
        self.put(&value.to_le_bytes())
    }

    pub(crate) fn put_count(&mut self, value: usize) -> Result<(), TreeError> {
        let value = u32::try_from(value)
            .map_err(|_| TreeError::UnableToWrite(format!("count {} does not fit in 32 bits", value)))?;
        self.put_u32(value)
    }

    /// Packs one bit per entry, least significant bit first.
    pub(crate) fn put_mask(&mut self, mask: &[bool]) -> Result<(), TreeError> {
        for chunk in mask.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (bit, &set)| byte | (u8::from(set) << bit));
            self.put_u8(byte)?;
        }
        Ok(())
    }

    pub(crate) fn put_rule(&mut self, rule: &Rule) -> Result<(), TreeError> {
        self.put_i32(rule.variable_index)?;
        self.put_u32(rule.payload())
    }
}

/// Sequential little-endian reader over a byte slice.
pub(crate) struct ByteReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn take<const N: usize>(&mut self) -> Result<[u8; N], TreeError> {
        let bytes = self
            .buffer
            .get(self.offset..self.offset + N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(TreeError::UnexpectedEndOfStream { offset: self.offset })?;
        self.offset += N;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, TreeError> {
        Ok(self.take::<1>()?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32, TreeError> {
        self.take().map(u32::from_le_bytes)
    }

    pub(crate) fn i32(&mut self) -> Result<i32, TreeError> {
        self.take().map(i32::from_le_bytes)
    }

    pub(crate) fn f64(&mut self) -> Result<f64, TreeError> {
        self.take().map(f64::from_le_bytes)
    }

    /// Reads the tag and version header.
    pub(crate) fn header(&mut self, expected: [u8; 4]) -> Result<(), TreeError> {
        let found = self.take::<4>()?;
        if found != expected {
            return Err(TreeError::BadTag { expected, found });
        }
        match self.u32()? {
            FORMAT_VERSION => Ok(()),
            version => Err(TreeError::UnsupportedVersion(version)),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub(crate) fn mask(&mut self, len: usize) -> Result<Vec<bool>, TreeError> {
        if mask_bytes(len) > self.remaining() {
            return Err(TreeError::UnexpectedEndOfStream { offset: self.offset });
        }
        let mut mask = Vec::with_capacity(len);
        for _ in 0..mask_bytes(len) {
            let byte = self.u8()?;
            for bit in 0..8 {
                if mask.len() < len {
                    mask.push(byte & (1 << bit) != 0);
                }
            }
        }
        Ok(mask)
    }

    pub(crate) fn rule(&mut self) -> Result<Rule, TreeError> {
        let variable_index = self.i32()?;
        let payload = self.u32()?;
        Ok(Rule::from_parts(variable_index, payload))
    }
}

#[inline]
pub(crate) fn mask_bytes(num_predictors: usize) -> usize {
    (num_predictors + 7) / 8
}

/// Logs a failed read before handing the error back.
pub(crate) fn log_read_failure<T>(what: &str, result: Result<T, TreeError>) -> Result<T, TreeError> {
    result.map_err(|err| {
        warn!("failed to read {}: {}", what, err);
        err
    })
}

impl Tree {
    /// Number of bytes [`Tree::serialize`] writes.
    pub fn get_serialized_length(&self) -> usize {
        let per_node = 1 + mask_bytes(self.num_predictors);
        16 + self
            .nodes
            .iter()
            .flatten()
            .map(|node| per_node + if node.is_bottom() { 16 } else { 8 })
            .sum::<usize>()
    }

    /// Writes the tree into `buffer` and returns the number of bytes used.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, TreeError> {
        let needed = self.get_serialized_length();
        if buffer.len() < needed {
            return Err(TreeError::BufferTooSmall {
                needed,
                available: buffer.len(),
            });
        }

        let mut writer = ByteWriter::new(buffer);
        writer.put(&TREE_TAG)?;
        writer.put_u32(FORMAT_VERSION)?;
        writer.put_count(self.num_predictors)?;
        writer.put_count(self.nodes.iter().flatten().count())?;

        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match node.kind {
                NodeKind::Internal { rule, left, right } => {
                    writer.put_u8(INTERNAL_FLAG)?;
                    writer.put_mask(&node.variables_available_for_split)?;
                    writer.put_rule(&rule)?;
                    stack.push(right);
                    stack.push(left);
                }
                NodeKind::Leaf {
                    average,
                    num_effective_observations,
                } => {
                    writer.put_u8(LEAF_FLAG)?;
                    writer.put_mask(&node.variables_available_for_split)?;
                    writer.put_f64(average)?;
                    writer.put_f64(num_effective_observations)?;
                }
            }
        }

        Ok(writer.offset())
    }

    /// Reads a tree without observations.
    ///
    /// Topology, rules, masks and leaf values are restored; every view is
    /// empty. Returns the tree and the number of bytes consumed.
    pub fn deserialize(buffer: &[u8]) -> Result<(Tree, usize), TreeError> {
        log_read_failure("tree", read_tree(buffer, None))
    }

    /// Reads a tree and re-derives its views from the training data in `ctx`.
    ///
    /// Leaf values are kept exactly as stored.
    pub fn deserialize_with(ctx: &TreeContext, buffer: &[u8]) -> Result<(Tree, usize), TreeError> {
        log_read_failure("tree", read_tree(buffer, Some(ctx)))
    }
}

fn read_tree(buffer: &[u8], ctx: Option<&TreeContext>) -> Result<(Tree, usize), TreeError> {
    let mut reader = ByteReader::new(buffer);
    reader.header(TREE_TAG)?;
    let num_predictors = reader.u32()? as usize;
    if let Some(ctx) = ctx {
        if ctx.num_predictors() != num_predictors {
            return Err(TreeError::PredictorMismatch {
                expected: ctx.num_predictors(),
                found: num_predictors,
            });
        }
    }
    let num_nodes = reader.u32()? as usize;

    let mut tree = Tree {
        nodes: Vec::new(),
        free: Vec::new(),
        indices: Vec::new(),
        num_predictors,
    };
    // (parent, is right child) of every node still to be read
    let mut pending: Vec<Option<(NodeId, bool)>> = vec![None];
    while let Some(slot) = pending.pop() {
        let id = read_node(&mut reader, &mut tree, slot.map(|(parent, _)| parent), num_nodes)?;
        if let Some((parent, is_right)) = slot {
            if let NodeKind::Internal { left, right, .. } = &mut tree.node_mut(parent).kind {
                if is_right {
                    *right = id;
                } else {
                    *left = id;
                }
            }
        }
        if !tree.node(id).is_bottom() {
            pending.push(Some((id, true)));
            pending.push(Some((id, false)));
        }
    }
    if tree.nodes.len() != num_nodes {
        return Err(TreeError::TrailingNodes);
    }
    tree.validate()
        .map_err(|err| TreeError::UnableToRead(err.to_string()))?;

    if let Some(ctx) = ctx {
        for node in tree.nodes.iter().flatten() {
            if let Some(rule) = node.rule() {
                rule.check(ctx)?;
            }
        }
        let num_observations = ctx.num_observations();
        tree.indices = (0..num_observations).collect();
        tree.node_mut(ROOT).length = num_observations;
        tree.add_observations_to_children(ctx, ROOT, None);
        tree.debug_check();
    }

    Ok((tree, reader.offset()))
}

/// Reads one node record. An internal node's children are patched in by the
/// caller once they have been read.
fn read_node(
    reader: &mut ByteReader,
    tree: &mut Tree,
    parent: Option<NodeId>,
    num_nodes: usize,
) -> Result<NodeId, TreeError> {
    if tree.nodes.len() >= num_nodes {
        return Err(TreeError::TrailingNodes);
    }

    let offset = reader.offset();
    let flag = reader.u8()?;
    let mask = reader.mask(tree.num_predictors)?;
    let id = tree.alloc(Node::leaf(parent, mask, 0, 0));

    match flag {
        LEAF_FLAG => {
            let average = reader.f64()?;
            let num_effective_observations = reader.f64()?;
            tree.node_mut(id).kind = NodeKind::Leaf {
                average,
                num_effective_observations,
            };
        }
        INTERNAL_FLAG => {
            let rule = reader.rule()?;
            if rule.variable().map_or(true, |v| v >= tree.num_predictors) {
                return Err(TreeError::MalformedNode { offset, flag });
            }
            tree.node_mut(id).kind = NodeKind::Internal {
                rule,
                left: id,
                right: id,
            };
        }
        _ => return Err(TreeError::MalformedNode { offset, flag }),
    }

    Ok(id)
}
