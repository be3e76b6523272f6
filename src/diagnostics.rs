//! Post-fit diagnostics for the reporting consumer.
//!
//! The scale of a good regularization grid is unknown up front, so after
//! fitting it pays to check where the selected values landed. Many targets
//! saturating an edge of the grid means the grid should be extended in that
//! direction; it is a symptom of a mis-scaled grid, not an error.

use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error("The regularization grid must contain at least one value.")]
    EmptyAlphaGrid,

    #[error("Selected alpha {0} does not appear in the supplied grid.")]
    AlphaNotInGrid(f64),
}

/// Distribution of the per-target selected regularization values over the
/// candidate grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaGridReport {
    /// Number of targets that selected each grid value, in grid order.
    pub counts: Vec<usize>,
    /// Targets that selected the smallest grid value.
    pub n_at_lower_edge: usize,
    /// Targets that selected the largest grid value. Targets with no
    /// predictive signal tend to land here, where heavy shrinkage drives
    /// predictions toward zero.
    pub n_at_upper_edge: usize,
    pub n_targets: usize,
}

impl AlphaGridReport {
    pub fn upper_edge_fraction(&self) -> f64 {
        if self.n_targets == 0 {
            0.0
        } else {
            self.n_at_upper_edge as f64 / self.n_targets as f64
        }
    }

    pub fn lower_edge_fraction(&self) -> f64 {
        if self.n_targets == 0 {
            0.0
        } else {
            self.n_at_lower_edge as f64 / self.n_targets as f64
        }
    }
}

/// Tallies the selected values against the grid they were chosen from.
pub fn alpha_grid_report(
    best_alphas: ArrayView1<f64>,
    grid: &[f64],
) -> Result<AlphaGridReport, DiagnosticsError> {
    if grid.is_empty() {
        return Err(DiagnosticsError::EmptyAlphaGrid);
    }
    let mut counts = vec![0usize; grid.len()];
    for &alpha in best_alphas.iter() {
        let index = grid
            .iter()
            .position(|&g| g == alpha)
            .ok_or(DiagnosticsError::AlphaNotInGrid(alpha))?;
        counts[index] += 1;
    }
    Ok(AlphaGridReport {
        n_at_lower_edge: counts[0],
        n_at_upper_edge: counts[grid.len() - 1],
        counts,
        n_targets: best_alphas.len(),
    })
}

/// Indices of the `k` best-scoring targets, best first. Useful to refit a
/// richer model on a small selection of well-predicted targets.
pub fn top_targets(scores: ArrayView1<f64>, k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_unstable_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices.truncate(k);
    indices
}
