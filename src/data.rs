//! Training data and cut-point tables consumed by the tree engine.
//!
//! The engine never looks at raw predictor values. Ordinal predictors are
//! discretized against a per-variable cut-point grid so that a code `c` and a
//! threshold index `k` satisfy `c <= k` exactly when the raw value is at most
//! `cut[k]`. Categorical predictors are stored as their category id.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::errors::TreeError;

/// Integer code of a discretized predictor value.
pub type XInt = u16;

/// Categorical rules hold one direction bit per category in a `u32`.
pub const MAX_NUM_CATEGORIES: usize = 32;

/// Declared type of a predictor. Decides how a [`crate::rule::Rule`] payload
/// is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    /// Ordered predictor split on a cut-point threshold.
    Ordinal,
    /// Unordered predictor split on a category subset.
    Categorical,
}

/// Response, discretized design matrices and optional observation weights.
///
/// The training matrix is stored variable-major so that the partitioning
/// kernel reads a single contiguous column per rule.
#[derive(Debug, Clone)]
pub struct Data {
    y: Array1<f64>,
    x: Vec<XInt>,
    x_test: Option<Array2<XInt>>,
    weights: Option<Vec<f64>>,
    variable_types: Vec<VariableType>,
    num_observations: usize,
    num_predictors: usize,
}

impl Data {
    /// Creates a new `Data` from a response and an `n x p` matrix of codes.
    pub fn new(
        y: Array1<f64>,
        x: ArrayView2<XInt>,
        variable_types: Vec<VariableType>,
    ) -> Result<Self, TreeError> {
        let (num_observations, num_predictors) = x.dim();
        if y.len() != num_observations {
            return Err(TreeError::InvalidData(format!(
                "response has {} entries but design matrix has {} rows",
                y.len(),
                num_observations
            )));
        }
        if variable_types.len() != num_predictors {
            return Err(TreeError::InvalidData(format!(
                "{} variable types given for {} predictors",
                variable_types.len(),
                num_predictors
            )));
        }
        check_categories(x, &variable_types)?;

        let mut columns = Vec::with_capacity(num_observations * num_predictors);
        for column in x.columns() {
            columns.extend(column.iter().copied());
        }

        Ok(Self {
            y,
            x: columns,
            x_test: None,
            weights: None,
            variable_types,
            num_observations,
            num_predictors,
        })
    }

    /// Attaches per-observation weights.
    pub fn with_weights(mut self, weights: Array1<f64>) -> Result<Self, TreeError> {
        if weights.len() != self.num_observations {
            return Err(TreeError::InvalidData(format!(
                "{} weights given for {} observations",
                weights.len(),
                self.num_observations
            )));
        }
        if let Some(w) = weights.iter().find(|w| !(**w >= 0.0) || !w.is_finite()) {
            return Err(TreeError::InvalidData(format!(
                "weights must be finite and non-negative, found {}",
                w
            )));
        }
        self.weights = Some(weights.to_vec());
        Ok(self)
    }

    /// Attaches an `m x p` matrix of discretized test observations.
    pub fn with_test(mut self, x_test: Array2<XInt>) -> Result<Self, TreeError> {
        if x_test.ncols() != self.num_predictors {
            return Err(TreeError::InvalidData(format!(
                "test matrix has {} columns, expected {}",
                x_test.ncols(),
                self.num_predictors
            )));
        }
        check_categories(x_test.view(), &self.variable_types)?;
        self.x_test = Some(x_test.as_standard_layout().into_owned());
        Ok(self)
    }

    /// Response (target) vector
    pub fn y(&self) -> ArrayView1<f64> {
        self.y.view()
    }

    /// Contiguous column of codes for `variable`.
    #[inline(always)]
    pub fn column(&self, variable: usize) -> &[XInt] {
        let start = variable * self.num_observations;
        &self.x[start..start + self.num_observations]
    }

    /// Code of observation `observation` for `variable`.
    #[inline(always)]
    pub fn x_at(&self, observation: usize, variable: usize) -> XInt {
        self.x[variable * self.num_observations + observation]
    }

    /// Test design matrix, one row per test observation.
    pub fn x_test(&self) -> Option<ArrayView2<XInt>> {
        self.x_test.as_ref().map(|x| x.view())
    }

    /// Observation weights, if any.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Declared predictor types.
    pub fn variable_types(&self) -> &[VariableType] {
        &self.variable_types
    }

    /// Number of training observations.
    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// Number of predictors.
    pub fn num_predictors(&self) -> usize {
        self.num_predictors
    }

    /// Number of test observations, zero when no test matrix is attached.
    pub fn num_test_observations(&self) -> usize {
        self.x_test.as_ref().map_or(0, |x| x.nrows())
    }
}

fn check_categories(x: ArrayView2<XInt>, variable_types: &[VariableType]) -> Result<(), TreeError> {
    for (variable, (column, variable_type)) in x.columns().into_iter().zip(variable_types).enumerate() {
        if *variable_type != VariableType::Categorical {
            continue;
        }
        if let Some(code) = column.iter().find(|&&c| c as usize >= MAX_NUM_CATEGORIES) {
            return Err(TreeError::InvalidData(format!(
                "categorical variable {} has category {} (at most {} supported)",
                variable, code, MAX_NUM_CATEGORIES
            )));
        }
    }
    Ok(())
}

/// Per-variable cut-point grid.
///
/// For ordinal variables entry `k` is the threshold of split index `k`. For
/// categorical variables the vector holds one entry per category and only its
/// length is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPoints {
    cuts: Vec<Vec<f64>>,
}

impl CutPoints {
    /// Creates a new grid. Ordinal grids must be strictly increasing.
    pub fn new(cuts: Vec<Vec<f64>>) -> Result<Self, TreeError> {
        for (variable, grid) in cuts.iter().enumerate() {
            if grid.len() > XInt::MAX as usize {
                return Err(TreeError::InvalidData(format!(
                    "variable {} has {} cut points, more than a code can index",
                    variable,
                    grid.len()
                )));
            }
            if grid.windows(2).any(|w| !(w[0] < w[1])) {
                return Err(TreeError::InvalidData(format!(
                    "cut points of variable {} are not strictly increasing",
                    variable
                )));
            }
        }
        Ok(Self { cuts })
    }

    /// Builds a grid from raw `n x p` data.
    ///
    /// Ordinal cut points are midpoints between consecutive distinct values,
    /// thinned evenly down to `max_num_cuts`. Categorical variables get one
    /// entry per category id present in the data.
    pub fn from_data(
        raw: ArrayView2<f64>,
        variable_types: &[VariableType],
        max_num_cuts: usize,
    ) -> Result<Self, TreeError> {
        if raw.ncols() != variable_types.len() {
            return Err(TreeError::InvalidData(format!(
                "{} variable types given for {} columns",
                variable_types.len(),
                raw.ncols()
            )));
        }

        let mut cuts = Vec::with_capacity(raw.ncols());
        for (column, variable_type) in raw.columns().into_iter().zip(variable_types) {
            let mut values: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();

            let grid = match variable_type {
                VariableType::Ordinal => {
                    let midpoints: Vec<f64> = values.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
                    thin_evenly(midpoints, max_num_cuts)
                }
                VariableType::Categorical => {
                    let num_categories = values.last().map_or(0, |&v| v as usize + 1);
                    (0..num_categories).map(|c| c as f64).collect()
                }
            };
            cuts.push(grid);
        }

        Self::new(cuts)
    }

    /// Number of variables in the grid.
    pub fn num_variables(&self) -> usize {
        self.cuts.len()
    }

    /// Number of cut points (or categories) of `variable`.
    pub fn num_cuts(&self, variable: usize) -> usize {
        self.cuts[variable].len()
    }

    /// Cut points of `variable`.
    pub fn get(&self, variable: usize) -> &[f64] {
        &self.cuts[variable]
    }

    /// Index of the cut point of `variable` nearest to `value`.
    ///
    /// Ties resolve to the lower index. Returns `None` for an empty grid.
    pub fn nearest_index(&self, variable: usize, value: f64) -> Option<usize> {
        let grid = &self.cuts[variable];
        if grid.is_empty() {
            return None;
        }
        let upper = grid.partition_point(|&c| c < value);
        if upper == 0 {
            return Some(0);
        }
        if upper == grid.len() {
            return Some(grid.len() - 1);
        }
        if value - grid[upper - 1] <= grid[upper] - value {
            Some(upper - 1)
        } else {
            Some(upper)
        }
    }

    /// Maps raw `n x p` values to codes.
    ///
    /// Ordinal values map to the number of cut points strictly below them;
    /// categorical values are taken as their category id.
    pub fn discretize(
        &self,
        raw: ArrayView2<f64>,
        variable_types: &[VariableType],
    ) -> Result<Array2<XInt>, TreeError> {
        if raw.ncols() != self.cuts.len() || variable_types.len() != self.cuts.len() {
            return Err(TreeError::InvalidData(format!(
                "matrix has {} columns, grid has {} variables",
                raw.ncols(),
                self.cuts.len()
            )));
        }

        let mut codes = Array2::zeros(raw.raw_dim());
        for (variable, (column, mut out)) in raw
            .columns()
            .into_iter()
            .zip(codes.columns_mut())
            .enumerate()
        {
            let grid = &self.cuts[variable];
            for (value, code) in column.iter().zip(out.iter_mut()) {
                *code = match variable_types[variable] {
                    VariableType::Ordinal => grid.partition_point(|&c| c < *value) as XInt,
                    VariableType::Categorical => {
                        if !(*value >= 0.0) || *value as usize >= grid.len().min(MAX_NUM_CATEGORIES) {
                            return Err(TreeError::InvalidData(format!(
                                "value {} of categorical variable {} is not a known category",
                                value, variable
                            )));
                        }
                        *value as XInt
                    }
                };
            }
        }

        Ok(codes)
    }
}

fn thin_evenly(values: Vec<f64>, max_len: usize) -> Vec<f64> {
    if values.len() <= max_len {
        return values;
    }
    if max_len == 0 {
        return Vec::new();
    }
    let step = values.len() as f64 / max_len as f64;
    (0..max_len)
        .map(|i| values[((i as f64 + 0.5) * step) as usize])
        .collect()
}
