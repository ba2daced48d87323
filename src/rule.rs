//! Split rules attached to internal nodes.
//!
//! A rule is a variable index plus a 32-bit payload. The payload is read as
//! an ordinal threshold index or as a categorical direction mask depending
//! on the declared type of the variable, it is not tagged separately.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::context::TreeContext;
use crate::data::{VariableType, XInt, MAX_NUM_CATEGORIES};
use crate::errors::TreeError;

/// Variable index of an unset rule.
pub const INVALID_RULE_VARIABLE: i32 = -1;

/// Split value reported for an unset rule.
pub const INVALID_SPLIT_VALUE: f64 = -1000.0;
/// Split value reported for a categorical rule.
pub const CATEGORICAL_SPLIT_VALUE: f64 = -2000.0;

/// Split predicate of an internal node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rule {
    /// Predictor the rule splits on, [`INVALID_RULE_VARIABLE`] when unset.
    pub variable_index: i32,
    payload: u32,
}

impl Default for Rule {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Rule {
    /// An unset rule.
    pub const fn invalid() -> Self {
        Self {
            variable_index: INVALID_RULE_VARIABLE,
            payload: INVALID_RULE_VARIABLE as u32,
        }
    }

    /// Ordinal rule: observations with code above `split_index` go right.
    pub fn ordinal(variable_index: usize, split_index: usize) -> Self {
        Self {
            variable_index: variable_index as i32,
            payload: split_index as u32,
        }
    }

    /// Categorical rule: categories whose bit is set go right.
    pub fn categorical(variable_index: usize, category_directions: u32) -> Self {
        Self {
            variable_index: variable_index as i32,
            payload: category_directions,
        }
    }

    /// Rebuilds a rule from its persisted parts.
    pub(crate) fn from_parts(variable_index: i32, payload: u32) -> Self {
        Self {
            variable_index,
            payload,
        }
    }

    pub(crate) fn payload(&self) -> u32 {
        self.payload
    }

    /// Whether a variable has been assigned.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.variable_index >= 0
    }

    /// The split variable, `None` when unset.
    #[inline]
    pub fn variable(&self) -> Option<usize> {
        usize::try_from(self.variable_index).ok()
    }

    /// Threshold index, meaningful for ordinal variables.
    #[inline]
    pub fn split_index(&self) -> i32 {
        self.payload as i32
    }

    /// Direction mask, meaningful for categorical variables.
    #[inline]
    pub fn category_directions(&self) -> u32 {
        self.payload
    }

    /// Resets the rule to the unset sentinel.
    pub fn invalidate(&mut self) {
        *self = Self::invalid();
    }

    /// Decides the side of a single code for a variable of `variable_type`.
    #[inline(always)]
    pub fn goes_right(&self, variable_type: VariableType, code: XInt) -> bool {
        match variable_type {
            VariableType::Categorical => self.category_goes_right(code as u32),
            VariableType::Ordinal => i64::from(code) > i64::from(self.split_index()),
        }
    }

    /// Decides the side of an observation given as one row of codes.
    pub fn goes_right_row(&self, variable_types: &[VariableType], row: ArrayView1<XInt>) -> bool {
        let variable = self.variable_index as usize;
        self.goes_right(variable_types[variable], row[variable])
    }

    /// Whether `category` is routed right.
    #[inline]
    pub fn category_goes_right(&self, category: u32) -> bool {
        1u32
            .checked_shl(category)
            .map_or(false, |bit| bit & self.payload != 0)
    }

    /// Routes `category` right. Categories past the mask width are ignored.
    pub fn set_category_goes_right(&mut self, category: u32) {
        if let Some(bit) = 1u32.checked_shl(category) {
            self.payload |= bit;
        }
    }

    /// Routes `category` left. Categories past the mask width already go left.
    pub fn set_category_goes_left(&mut self, category: u32) {
        if let Some(bit) = 1u32.checked_shl(category) {
            self.payload &= !bit;
        }
    }

    /// Raw threshold behind an ordinal rule.
    ///
    /// Unset and categorical rules report [`INVALID_SPLIT_VALUE`] and
    /// [`CATEGORICAL_SPLIT_VALUE`] respectively.
    pub fn get_split_value(&self, ctx: &TreeContext) -> f64 {
        let Some(variable) = self.variable() else {
            return INVALID_SPLIT_VALUE;
        };
        if ctx.variable_type(variable) != VariableType::Ordinal {
            return CATEGORICAL_SPLIT_VALUE;
        }
        ctx.cut_points
            .get(variable)
            .get(self.split_index() as usize)
            .copied()
            .unwrap_or(INVALID_SPLIT_VALUE)
    }

    /// Checks the rule against the data and returns its variable.
    ///
    /// Ordinal thresholds must index a cut point and categorical masks may
    /// only route categories that exist.
    pub fn check(&self, ctx: &TreeContext) -> Result<usize, TreeError> {
        let variable = self
            .variable()
            .filter(|&v| v < ctx.num_predictors())
            .ok_or_else(|| TreeError::InvalidRule(format!("variable {} out of range", self.variable_index)))?;
        match ctx.variable_type(variable) {
            VariableType::Ordinal => {
                let num_cuts = ctx.cut_points.num_cuts(variable);
                if self.split_index() < 0 || self.split_index() as usize >= num_cuts {
                    return Err(TreeError::InvalidRule(format!(
                        "split index {} with {} cut points on variable {}",
                        self.split_index(),
                        num_cuts,
                        variable
                    )));
                }
            }
            VariableType::Categorical => {
                let num_categories = ctx.cut_points.num_cuts(variable).min(MAX_NUM_CATEGORIES);
                if num_categories < MAX_NUM_CATEGORIES && self.payload >> num_categories != 0 {
                    return Err(TreeError::InvalidRule(format!(
                        "category mask {:#b} exceeds {} categories on variable {}",
                        self.payload, num_categories, variable
                    )));
                }
            }
        }
        Ok(variable)
    }

    /// Bitwise equality of variable and payload.
    pub fn equals(&self, other: &Rule) -> bool {
        self.variable_index == other.variable_index && self.payload == other.payload
    }

    /// Overwrites this rule with `other`.
    pub fn copy_from(&mut self, other: &Rule) {
        if !other.is_valid() {
            self.invalidate();
            return;
        }
        *self = *other;
    }

    /// Exchanges this rule with `other` in place.
    pub fn swap_with(&mut self, other: &mut Rule) {
        std::mem::swap(self, other);
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Rule {}
