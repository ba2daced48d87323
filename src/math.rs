//! Reductions over a node's index view.
//!
//! When a pool handle is supplied and the view is long enough, partial sums
//! are computed per fixed-size chunk on the pool and combined in chunk order,
//! so the result does not depend on how work was scheduled. The call blocks
//! until every chunk has been combined.

use log::trace;
use rayon::prelude::*;
use rayon::ThreadPool;

/// Chunk length of one pooled partial sum.
pub const PARALLEL_CHUNK_SIZE: usize = 4096;

fn reduce_indexed<F>(pool: Option<&ThreadPool>, indices: &[usize], term: F) -> (f64, f64)
where
    F: Fn(usize) -> (f64, f64) + Sync,
{
    let serial = |chunk: &[usize]| {
        chunk.iter().fold((0.0, 0.0), |(a, b), &i| {
            let (x, y) = term(i);
            (a + x, b + y)
        })
    };

    match pool {
        Some(pool) if indices.len() >= 2 * PARALLEL_CHUNK_SIZE => {
            trace!(
                "pooled reduction over {} observations on {} threads",
                indices.len(),
                pool.current_num_threads()
            );
            let partials: Vec<(f64, f64)> =
                pool.install(|| indices.par_chunks(PARALLEL_CHUNK_SIZE).map(serial).collect());
            partials
                .into_iter()
                .fold((0.0, 0.0), |(a, b), (x, y)| (a + x, b + y))
        }
        _ => serial(indices),
    }
}

/// Mean of `y` over `indices`, zero for an empty view.
pub fn compute_indexed_mean(pool: Option<&ThreadPool>, y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let (sum, _) = reduce_indexed(pool, indices, |i| (y[i], 0.0));
    sum / indices.len() as f64
}

/// Weighted mean of `y` over `indices` and the total weight of the view.
pub fn compute_indexed_weighted_mean(
    pool: Option<&ThreadPool>,
    y: &[f64],
    indices: &[usize],
    weights: &[f64],
) -> (f64, f64) {
    let (weighted_sum, total_weight) = reduce_indexed(pool, indices, |i| (weights[i] * y[i], weights[i]));
    if total_weight <= 0.0 {
        return (0.0, total_weight);
    }
    (weighted_sum / total_weight, total_weight)
}

/// Sum of squared deviations of `y` from `mean` over `indices`.
pub fn compute_indexed_variance_for_known_mean(
    pool: Option<&ThreadPool>,
    y: &[f64],
    indices: &[usize],
    mean: f64,
) -> f64 {
    let (sum_sq, _) = reduce_indexed(pool, indices, |i| {
        let deviation = y[i] - mean;
        (deviation * deviation, 0.0)
    });
    sum_sq
}

/// Weighted sum of squared deviations of `y` from `mean` over `indices`.
pub fn compute_indexed_weighted_variance_for_known_mean(
    pool: Option<&ThreadPool>,
    y: &[f64],
    indices: &[usize],
    weights: &[f64],
    mean: f64,
) -> f64 {
    let (sum_sq, _) = reduce_indexed(pool, indices, |i| {
        let deviation = y[i] - mean;
        (weights[i] * deviation * deviation, 0.0)
    });
    sum_sq
}
