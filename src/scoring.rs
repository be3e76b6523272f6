//! Generalization scoring for multi-target regression.

use ndarray::{Array1, ArrayView2, Axis};
use thiserror::Error;

/// Score reported for a target whose variance is zero (constant column).
/// R² is undefined there; a defined sentinel is returned instead of
/// propagating a floating-point fault.
pub const DEGENERATE_SCORE: f64 = 0.0;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error(
        "Observed matrix is {observed_rows}x{observed_cols} but predicted matrix is {predicted_rows}x{predicted_cols}."
    )]
    ShapeMismatch {
        observed_rows: usize,
        observed_cols: usize,
        predicted_rows: usize,
        predicted_cols: usize,
    },
}

/// Coefficient of determination, per target column.
///
/// `R² = 1 − SS_res / SS_tot`, with each column's own mean as the baseline.
/// Values may be negative (predictions worse than the mean) and are bounded
/// above by 1. A constant column yields [`DEGENERATE_SCORE`].
pub fn r2_score(
    y_true: ArrayView2<f64>,
    y_pred: ArrayView2<f64>,
) -> Result<Array1<f64>, ScoreError> {
    if y_true.dim() != y_pred.dim() {
        return Err(ScoreError::ShapeMismatch {
            observed_rows: y_true.nrows(),
            observed_cols: y_true.ncols(),
            predicted_rows: y_pred.nrows(),
            predicted_cols: y_pred.ncols(),
        });
    }
    let mut scores = Array1::from_elem(y_true.ncols(), DEGENERATE_SCORE);
    if y_true.nrows() == 0 {
        return Ok(scores);
    }
    for (score, (col_true, col_pred)) in scores.iter_mut().zip(
        y_true
            .axis_iter(Axis(1))
            .zip(y_pred.axis_iter(Axis(1))),
    ) {
        let mean = col_true.mean().unwrap_or(0.0);
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (&observed, &predicted) in col_true.iter().zip(col_pred.iter()) {
            ss_res += (observed - predicted).powi(2);
            ss_tot += (observed - mean).powi(2);
        }
        if ss_tot > 0.0 {
            *score = 1.0 - ss_res / ss_tot;
        }
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn perfect_prediction_scores_one() {
        let y = array![[1.0, -2.0], [3.0, 0.5], [2.0, 4.0]];
        let scores = r2_score(y.view(), y.view()).unwrap();
        assert_abs_diff_eq!(scores[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn matches_the_explicit_formula() {
        let y_true = array![[1.0], [2.0], [4.0], [5.0]];
        let y_pred = array![[1.5], [1.5], [4.5], [4.0]];
        let scores = r2_score(y_true.view(), y_pred.view()).unwrap();

        let mean = 3.0;
        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        assert_abs_diff_eq!(scores[0], 1.0 - ss_res / ss_tot, epsilon = 1e-12);
    }

    #[test]
    fn worse_than_mean_predictions_score_negative() {
        let y_true = array![[1.0], [-1.0]];
        let y_pred = array![[-10.0], [10.0]];
        let scores = r2_score(y_true.view(), y_pred.view()).unwrap();
        assert!(scores[0] < 0.0);
    }

    #[test]
    fn constant_column_yields_the_sentinel() {
        let y_true = array![[2.0, 1.0], [2.0, 3.0]];
        let y_pred = array![[0.0, 1.0], [5.0, 3.0]];
        let scores = r2_score(y_true.view(), y_pred.view()).unwrap();
        assert_eq!(scores[0], DEGENERATE_SCORE);
        assert!(scores[0].is_finite());
        assert_abs_diff_eq!(scores[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let y_true = array![[1.0], [2.0]];
        let y_pred = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(matches!(
            r2_score(y_true.view(), y_pred.view()).unwrap_err(),
            ScoreError::ShapeMismatch { .. }
        ));
    }
}
