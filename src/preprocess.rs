//! Feature preprocessing: center-only scaling and time-delay embedding.
//!
//! Both transforms are applied before the regression estimator. The scaler
//! learns its per-column means from training data only and reapplies them
//! unchanged at prediction time. The delayer is stateless: it expands a
//! feature matrix into column-wise concatenated copies shifted forward in
//! time, so the regression can weight each delay separately and capture the
//! lag between stimulus and response.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

/// A comprehensive error type for preprocessing operations.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("The scaler must be fitted before transforming data.")]
    ScalerNotFitted,

    #[error("Matrix has {found} columns, but the scaler was fitted on {expected}.")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("The delay list must contain at least one delay.")]
    EmptyDelays,

    #[error(
        "Coefficient matrix has {rows} rows, which cannot be split into {n_delays} equal per-delay blocks."
    )]
    CoefficientRowsNotDivisible { rows: usize, n_delays: usize },
}

/// Center-only feature scaler.
///
/// Subtracts the per-column mean computed at fit time. No scaling to unit
/// variance is applied, matching a linear model fitted without an intercept.
#[derive(Debug, Clone, Default)]
pub struct Scaler {
    mean: Option<Array1<f64>>,
}

impl Scaler {
    pub fn new() -> Self {
        Self { mean: None }
    }

    /// Rebuilds a scaler from a stored mean vector, e.g. when loading a
    /// trained model from disk.
    pub fn with_mean(mean: Array1<f64>) -> Self {
        Self { mean: Some(mean) }
    }

    /// Computes and stores the per-column mean of the training matrix.
    pub fn fit(&mut self, x: ArrayView2<f64>) {
        self.mean = Some(
            x.mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(x.ncols())),
        );
    }

    /// Subtracts the stored per-column mean from every row. The mean is
    /// never recomputed here, so test data is centered with the training
    /// statistics.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, PreprocessError> {
        let mean = self.mean.as_ref().ok_or(PreprocessError::ScalerNotFitted)?;
        if x.ncols() != mean.len() {
            return Err(PreprocessError::ColumnCountMismatch {
                expected: mean.len(),
                found: x.ncols(),
            });
        }
        Ok(&x - mean)
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>, PreprocessError> {
        self.fit(x);
        self.transform(x)
    }

    /// The stored per-column mean, if fitted.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }
}

/// Time-delay embedding.
///
/// For each delay `d`, produces a copy of the input shifted forward by `d`
/// rows: row `i` of the copy holds input row `i - d`, and rows with
/// `i < d` are zero-filled. There is no wraparound and no look-ahead. The
/// output is the column-wise concatenation of the per-delay copies,
/// preserving delay order.
#[derive(Debug, Clone)]
pub struct Delayer {
    delays: Vec<usize>,
}

impl Delayer {
    pub fn new(delays: Vec<usize>) -> Result<Self, PreprocessError> {
        if delays.is_empty() {
            return Err(PreprocessError::EmptyDelays);
        }
        Ok(Self { delays })
    }

    pub fn delays(&self) -> &[usize] {
        &self.delays
    }

    /// Expands `x` into its delayed representation. Stateless: nothing is
    /// learned from the data, so the same delays must be applied to train
    /// and test matrices.
    ///
    /// Output shape: `[x.nrows(), x.ncols() * delays.len()]`.
    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let (n_rows, n_cols) = x.dim();
        let mut out = Array2::zeros((n_rows, n_cols * self.delays.len()));
        for (block, &delay) in self.delays.iter().enumerate() {
            if delay >= n_rows {
                // The whole block falls before the start of the sequence.
                continue;
            }
            let col0 = block * n_cols;
            out.slice_mut(s![delay.., col0..col0 + n_cols])
                .assign(&x.slice(s![..n_rows - delay, ..]));
        }
        out
    }

    /// Splits a primal coefficient matrix of shape
    /// `[n_features * n_delays, n_targets]` back into one
    /// `[n_features, n_targets]` block per delay, in delay order. Useful to
    /// inspect the temporal response profile captured by the model weights.
    pub fn split_coefficients(
        &self,
        coef: ArrayView2<f64>,
    ) -> Result<Vec<Array2<f64>>, PreprocessError> {
        let n_delays = self.delays.len();
        if coef.nrows() % n_delays != 0 {
            return Err(PreprocessError::CoefficientRowsNotDivisible {
                rows: coef.nrows(),
                n_delays,
            });
        }
        let block = coef.nrows() / n_delays;
        Ok((0..n_delays)
            .map(|k| coef.slice(s![k * block..(k + 1) * block, ..]).to_owned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn centering_produces_exactly_zero_column_means() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 33.0]];
        let mut scaler = Scaler::new();
        let centered = scaler.fit_transform(x.view()).unwrap();
        let means = centered.mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(means[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(means[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn transform_reuses_training_mean_on_new_data() {
        let train = array![[0.0], [2.0]]; // mean 1.0
        let test = array![[10.0], [20.0]];
        let mut scaler = Scaler::new();
        scaler.fit(train.view());
        let out = scaler.transform(test.view()).unwrap();
        // The test matrix is shifted by the train mean, not recentered.
        assert_abs_diff_eq!(out[[0, 0]], 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[1, 0]], 19.0, epsilon = 1e-12);
        assert!(out.mean_axis(Axis(0)).unwrap()[0].abs() > 1.0);
    }

    #[test]
    fn transform_before_fit_is_an_error() {
        let scaler = Scaler::new();
        assert!(matches!(
            scaler.transform(array![[1.0]].view()).unwrap_err(),
            PreprocessError::ScalerNotFitted
        ));
    }

    #[test]
    fn transform_rejects_column_count_mismatch() {
        let mut scaler = Scaler::new();
        scaler.fit(array![[1.0, 2.0]].view());
        match scaler.transform(array![[1.0]].view()).unwrap_err() {
            PreprocessError::ColumnCountMismatch { expected, found } => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected ColumnCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn delay_zero_is_the_identity() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let delayer = Delayer::new(vec![0]).unwrap();
        let out = delayer.transform(x.view());
        assert_eq!(out, x);
    }

    #[test]
    fn delayed_blocks_shift_rows_and_zero_fill_the_start() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let delayer = Delayer::new(vec![0, 1, 2]).unwrap();
        let out = delayer.transform(x.view());
        assert_eq!(out.shape(), &[4, 3]);
        // Delay 0 block: identity.
        assert_eq!(out.column(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        // Delay 1 block: row i holds input row i - 1, zero at the start.
        assert_eq!(out.column(1).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        // Delay 2 block.
        assert_eq!(out.column(2).to_vec(), vec![0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn output_columns_scale_with_delay_count() {
        let x = Array2::<f64>::ones((5, 3));
        let delayer = Delayer::new(vec![1, 2, 3, 4]).unwrap();
        let out = delayer.transform(x.view());
        assert_eq!(out.shape(), &[5, 12]);
    }

    #[test]
    fn delay_longer_than_sequence_gives_zero_block() {
        let x = array![[1.0], [2.0]];
        let delayer = Delayer::new(vec![5]).unwrap();
        let out = delayer.transform(x.view());
        assert_eq!(out, Array2::<f64>::zeros((2, 1)));
    }

    #[test]
    fn empty_delay_list_is_rejected() {
        assert!(matches!(
            Delayer::new(vec![]).unwrap_err(),
            PreprocessError::EmptyDelays
        ));
    }

    #[test]
    fn split_coefficients_recovers_per_delay_blocks() {
        let delayer = Delayer::new(vec![0, 1]).unwrap();
        let coef = array![[1.0], [2.0], [3.0], [4.0]];
        let blocks = delayer.split_coefficients(coef.view()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], array![[1.0], [2.0]]);
        assert_eq!(blocks[1], array![[3.0], [4.0]]);

        let bad = array![[1.0], [2.0], [3.0]];
        assert!(matches!(
            delayer.split_coefficients(bad.view()).unwrap_err(),
            PreprocessError::CoefficientRowsNotDivisible { .. }
        ));
    }
}
