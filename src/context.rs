//! Explicit context threaded through every tree operation that needs shared
//! collaborators: the training data, the cut-point grid and an optional
//! worker pool for leaf reductions.

use rayon::ThreadPool;

use crate::data::{CutPoints, Data, VariableType};
use crate::errors::TreeError;

/// Borrowed handles to the immutable inputs of one chain.
///
/// Several chains may share the same `Data` and `CutPoints`; each builds its
/// own context. Nothing in here is mutated by the engine.
#[derive(Clone, Copy)]
pub struct TreeContext<'a> {
    /// Training (and optional test) data.
    pub data: &'a Data,
    /// Cut-point grid the rules index into.
    pub cut_points: &'a CutPoints,
    /// Pool used to parallelize leaf reductions.
    pub thread_pool: Option<&'a ThreadPool>,
}

impl<'a> TreeContext<'a> {
    /// Creates a context without a worker pool.
    pub fn new(data: &'a Data, cut_points: &'a CutPoints) -> Result<Self, TreeError> {
        if cut_points.num_variables() != data.num_predictors() {
            return Err(TreeError::InvalidData(format!(
                "cut-point grid has {} variables, data has {} predictors",
                cut_points.num_variables(),
                data.num_predictors()
            )));
        }
        Ok(Self {
            data,
            cut_points,
            thread_pool: None,
        })
    }

    /// Routes leaf reductions through `pool`.
    pub fn with_thread_pool(mut self, pool: &'a ThreadPool) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    /// Number of training observations.
    #[inline]
    pub fn num_observations(&self) -> usize {
        self.data.num_observations()
    }

    /// Number of predictors.
    #[inline]
    pub fn num_predictors(&self) -> usize {
        self.data.num_predictors()
    }

    /// Declared type of `variable`.
    #[inline]
    pub fn variable_type(&self, variable: usize) -> VariableType {
        self.data.variable_types()[variable]
    }

    /// Observation weights, if any.
    #[inline]
    pub fn weights(&self) -> Option<&'a [f64]> {
        self.data.weights()
    }
}
