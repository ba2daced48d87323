//! In-place partitioning of observation indices by a split rule.
//!
//! Both kernels reorder a slice so the observations that go left form a
//! prefix and return the prefix length. They scan from both ends, swapping
//! mismatched pairs until the cursors meet, in O(n) time without extra
//! memory. An already partitioned slice is left untouched.

use crate::context::TreeContext;
use crate::data::VariableType;
use crate::rule::Rule;

/// Partitions a slice that stands for the dense range `0..indices.len()`.
///
/// Every slot is rewritten, so the previous contents are irrelevant. The
/// classifier is evaluated on positions directly, which avoids an indirect
/// load per observation at the tree root.
pub fn partition_range<F>(goes_right: F, indices: &mut [usize]) -> usize
where
    F: Fn(usize) -> bool,
{
    for (i, index) in indices.iter_mut().enumerate() {
        *index = i;
    }

    let mut lh = 0;
    let mut rh = indices.len();
    loop {
        while lh < rh && !goes_right(lh) {
            lh += 1;
        }
        while lh < rh && goes_right(rh - 1) {
            rh -= 1;
        }
        if lh >= rh {
            break;
        }
        // positions lh and rh - 1 are still untouched, so they hold themselves
        indices[lh] = rh - 1;
        indices[rh - 1] = lh;
        lh += 1;
        rh -= 1;
    }

    lh
}

/// Partitions an arbitrarily permuted slice of observation indices.
pub fn partition_indices<F>(goes_right: F, indices: &mut [usize]) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut lh = 0;
    let mut rh = indices.len();
    loop {
        while lh < rh && !goes_right(indices[lh]) {
            lh += 1;
        }
        while lh < rh && goes_right(indices[rh - 1]) {
            rh -= 1;
        }
        if lh >= rh {
            break;
        }
        indices.swap(lh, rh - 1);
        lh += 1;
        rh -= 1;
    }

    lh
}

/// Partitions `indices` by `rule` against the training data in `ctx`.
///
/// `is_top` selects the dense-range kernel used at the tree root.
pub fn partition(ctx: &TreeContext, rule: &Rule, indices: &mut [usize], is_top: bool) -> usize {
    let variable = rule.variable_index as usize;
    let column = ctx.data.column(variable);

    match ctx.variable_type(variable) {
        VariableType::Ordinal => {
            let split_index = i64::from(rule.split_index());
            let goes_right = |i: usize| i64::from(column[i]) > split_index;
            if is_top {
                partition_range(goes_right, indices)
            } else {
                partition_indices(goes_right, indices)
            }
        }
        VariableType::Categorical => {
            let goes_right = |i: usize| rule.category_goes_right(column[i] as u32);
            if is_top {
                partition_range(goes_right, indices)
            } else {
                partition_indices(goes_right, indices)
            }
        }
    }
}
