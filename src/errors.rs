//! Errors
//!
//! Error types used by the tree engine. Malformed or truncated persisted
//! streams and invalid inputs are recoverable and returned to the caller;
//! [`TreeError::InvariantViolation`] signals a programming defect.
use thiserror::Error;

/// Errors that can occur while building, mutating or persisting trees.
#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    /// Caller supplied buffer cannot hold the serialized object.
    #[error("Buffer too small: {needed} bytes needed, {available} available.")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes provided.
        available: usize,
    },
    /// Stream ended before the object was complete.
    #[error("Unexpected end of stream at byte offset {offset}.")]
    UnexpectedEndOfStream {
        /// Offset of the failed read.
        offset: usize,
    },
    /// Stream does not start with the expected tag.
    #[error("Bad stream tag, expected {expected:?} but found {found:?}.")]
    BadTag {
        /// Tag the reader expects.
        expected: [u8; 4],
        /// Tag found in the stream.
        found: [u8; 4],
    },
    /// Stream was written by an unknown format version.
    #[error("Unsupported format version {0}.")]
    UnsupportedVersion(u32),
    /// Stream was written for a different number of predictors.
    #[error("Stream has {found} predictors, expected {expected}.")]
    PredictorMismatch {
        /// Predictor count of the reader.
        expected: usize,
        /// Predictor count in the stream.
        found: usize,
    },
    /// A node record could not be decoded.
    #[error("Malformed node record at byte offset {offset} (flag {flag}).")]
    MalformedNode {
        /// Offset of the node record.
        offset: usize,
        /// Flag byte found.
        flag: u8,
    },
    /// The declared node count does not match the decoded topology.
    #[error("Node count in stream does not match the decoded topology.")]
    TrailingNodes,
    /// When attempting to split a node that is not a leaf.
    #[error("Cannot split non-leaf node {0}.")]
    NonLeafSplit(usize),
    /// Node index does not address a live node.
    #[error("Node index {0} does not exist.")]
    InvalidNodeIndex(usize),
    /// Merging requires both children to be leaves.
    #[error("Children of node {0} are not both leaves.")]
    NotNoGrandNode(usize),
    /// A leaf-indexed vector does not match the number of leaves.
    #[error("Expected {expected} leaf values, found {found}.")]
    LeafCountMismatch {
        /// Number of leaves in the tree.
        expected: usize,
        /// Length of the vector supplied.
        found: usize,
    },
    /// Input data failed validation.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// A rule is unset or does not fit the data.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),
    /// Unable to write an object.
    #[error("Unable to write object: {0}")]
    UnableToWrite(String),
    /// Unable to read an object.
    #[error("Unable to read object: {0}")]
    UnableToRead(String),
    /// A structural invariant does not hold.
    #[error("Invariant violated at node {node}: {detail}")]
    InvariantViolation {
        /// Arena index of the offending node.
        node: usize,
        /// What went wrong.
        detail: String,
    },
}
