//! Sampling operations the tree engine delegates to its collaborators.
//!
//! This module provides:
//! - `TreePrior`: the depth-penalizing probability that a node splits, plus
//!   the choice of a split variable among the eligible ones
//! - `EndNodeModel`: the posterior draw of a leaf value given its average and
//!   effective observation count
//!
//! `CgmPrior` and `MeanNormalModel` are the default implementations. The
//! engine only calls through the traits.

use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::errors::TreeError;

/// Prior over tree shapes.
pub trait TreePrior {
    /// Probability that a node at `depth` (root = 0) is split.
    fn split_probability(&self, depth: usize) -> f64;

    /// Picks one variable out of the non-empty `eligible` list.
    fn choose_variable<R: Rng + ?Sized>(&self, rng: &mut R, eligible: &[usize]) -> usize {
        eligible[rng.gen_range(0..eligible.len())]
    }

    /// Sample a boolean flag indicating if a node should be split or not.
    ///
    /// The deeper a leaf node, the greater the prior probability it will
    /// remain a leaf node.
    fn sample_split_flag<R: Rng + ?Sized>(&self, rng: &mut R, depth: usize) -> bool {
        rng.gen::<f64>() < self.split_probability(depth)
    }
}

/// Chipman, George and McCulloch tree prior: `base * (1 + depth)^-power`.
#[derive(Debug, Clone)]
pub struct CgmPrior {
    /// Split probability of the root, contained in (0, 1).
    pub base: f64,
    /// Rate at which deeper nodes are penalized, non-negative.
    pub power: f64,
    /// Optional relative weight of each predictor as a split variable.
    pub variable_weights: Option<Vec<f64>>,
}

impl CgmPrior {
    /// Creates a new `CgmPrior` choosing split variables uniformly.
    pub fn new(base: f64, power: f64) -> Result<Self, TreeError> {
        if !(base > 0.0 && base < 1.0) {
            return Err(TreeError::InvalidData(format!("prior base must lie in (0, 1), got {}", base)));
        }
        if !(power >= 0.0) {
            return Err(TreeError::InvalidData(format!("prior power must be non-negative, got {}", power)));
        }
        Ok(Self {
            base,
            power,
            variable_weights: None,
        })
    }

    /// Chooses split variables proportionally to `weights`.
    pub fn with_variable_weights(mut self, weights: Vec<f64>) -> Result<Self, TreeError> {
        if weights.iter().any(|w| !(*w >= 0.0)) || !weights.iter().any(|w| *w > 0.0) {
            return Err(TreeError::InvalidData(
                "variable weights must be non-negative and not all zero".to_string(),
            ));
        }
        self.variable_weights = Some(weights);
        Ok(self)
    }
}

impl Default for CgmPrior {
    fn default() -> Self {
        Self {
            base: 0.95,
            power: 2.0,
            variable_weights: None,
        }
    }
}

impl TreePrior for CgmPrior {
    fn split_probability(&self, depth: usize) -> f64 {
        self.base * (1.0 + depth as f64).powf(-self.power)
    }

    fn choose_variable<R: Rng + ?Sized>(&self, rng: &mut R, eligible: &[usize]) -> usize {
        let Some(weights) = &self.variable_weights else {
            return eligible[rng.gen_range(0..eligible.len())];
        };
        match WeightedIndex::new(eligible.iter().map(|&v| weights.get(v).copied().unwrap_or(0.0))) {
            Ok(dist) => eligible[dist.sample(rng)],
            // every eligible variable has zero weight
            Err(_) => eligible[rng.gen_range(0..eligible.len())],
        }
    }
}

/// Model of the value carried by a leaf.
pub trait EndNodeModel {
    /// Draws a leaf value from its conditional posterior.
    fn draw_from_posterior<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        average: f64,
        num_effective_observations: f64,
        residual_variance: f64,
    ) -> f64;
}

/// Normal prior with mean zero and the given precision on every leaf value.
#[derive(Debug, Clone)]
pub struct MeanNormalModel {
    /// Prior precision of a leaf value.
    pub precision: f64,
}

impl MeanNormalModel {
    /// Creates a new `MeanNormalModel`.
    pub fn new(precision: f64) -> Result<Self, TreeError> {
        if !(precision > 0.0) {
            return Err(TreeError::InvalidData(format!("precision must be positive, got {}", precision)));
        }
        Ok(Self { precision })
    }
}

impl EndNodeModel for MeanNormalModel {
    fn draw_from_posterior<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        average: f64,
        num_effective_observations: f64,
        residual_variance: f64,
    ) -> f64 {
        let data_precision = num_effective_observations / residual_variance;
        let posterior_precision = data_precision + self.precision;
        let posterior_mean = data_precision * average / posterior_precision;

        // posterior_precision is strictly positive, so the scale is finite
        match Normal::new(posterior_mean, posterior_precision.sqrt().recip()) {
            Ok(normal) => normal.sample(rng),
            Err(_) => posterior_mean,
        }
    }
}
