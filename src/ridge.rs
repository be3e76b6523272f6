//! # Cross-Validated Ridge Regression with Per-Target Regularization
//!
//! This module fits a ridge-type linear model to many target columns at
//! once, selecting a separate regularization strength for each target over
//! a caller-supplied cross-validation scheme:
//!
//! 1. For every CV split, the Gram matrix of the split's training block is
//!    eigendecomposed once and reused across the whole candidate grid, so
//!    adding candidates costs only diagonal rescalings.
//! 2. Validation R² is averaged across splits per (candidate, target), and
//!    each target keeps the candidate maximizing the average. Ties keep the
//!    first-seen (smallest-index) candidate.
//! 3. The model is refitted on the full training data with each target's
//!    selected value.
//!
//! Two mathematically equivalent formulations are available. The dual
//! (kernel) formulation works on the `n × n` matrix `X Xᵀ` and is the right
//! choice when features outnumber samples, the common case for delayed
//! stimulus features; the primal formulation works on the `p × p` matrix
//! `Xᵀ X`. `Formulation::Auto` picks between them from the training shape.

use crate::cv::CvSplit;
use crate::scoring::{self, ScoreError};
use itertools::izip;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{Eigh, UPLO};
use rayon::prelude::*;
use std::ops::Range;
use thiserror::Error;

/// A comprehensive error type for estimator construction and fitting.
#[derive(Error, Debug)]
pub enum RidgeError {
    #[error("The regularization grid must contain at least one value.")]
    EmptyAlphaGrid,

    #[error("Regularization values must be positive and finite, but the grid contains {0}.")]
    InvalidAlpha(f64),

    #[error("Feature matrix has {x_rows} rows but target matrix has {y_rows}.")]
    SampleCountMismatch { x_rows: usize, y_rows: usize },

    #[error(
        "Non-finite values found in the {0} matrix. Substitute them explicitly (e.g. zero-fill) before fitting."
    )]
    NonFiniteInput(&'static str),

    #[error("At least one cross-validation split is required.")]
    NoCvSplits,

    #[error(
        "A cross-validation split references row {index}, but only {n_samples} samples are available."
    )]
    SplitIndexOutOfRange { index: usize, n_samples: usize },

    #[error("The estimator must be fitted before calling this operation.")]
    NotFitted,

    #[error("Prediction features have {found} columns, but the model was fitted with {expected}.")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("Eigendecomposition of the Gram matrix failed: {0}")]
    Eigendecomposition(#[from] ndarray_linalg::error::LinalgError),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Which ridge formulation to solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    /// Dual when `n_features > n_samples`, primal otherwise.
    Auto,
    /// Always solve in feature space (`Xᵀ X`).
    Primal,
    /// Always solve in sample space (`X Xᵀ`).
    Dual,
}

/// Memory-batching knobs for the solver. Batching bounds peak memory; the
/// fitted model and all scores are invariant to the batch size.
#[derive(Debug, Clone)]
pub struct SolverParams {
    /// Number of target columns solved per batch.
    pub n_targets_batch: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            n_targets_batch: 512,
        }
    }
}

#[derive(Debug)]
enum FittedCoef {
    /// Feature-space coefficients, shape `[n_features, n_targets]`.
    Primal { coef: Array2<f64> },
    /// Sample-space coefficients, shape `[n_train, n_targets]`, plus the
    /// training features needed to evaluate the linear kernel at predict
    /// time.
    Dual {
        dual_coef: Array2<f64>,
        x_train: Array2<f64>,
    },
}

#[derive(Debug)]
struct FittedState {
    n_features: usize,
    best_alphas: Array1<f64>,
    /// Mean validation R² per (candidate, target), kept for diagnostics.
    cv_scores: Array2<f64>,
    coef: FittedCoef,
}

/// Ridge regression with per-target cross-validated regularization.
#[derive(Debug)]
pub struct RidgeCv {
    alphas: Vec<f64>,
    formulation: Formulation,
    params: SolverParams,
    fitted: Option<FittedState>,
}

impl RidgeCv {
    pub fn new(
        alphas: Vec<f64>,
        formulation: Formulation,
        params: SolverParams,
    ) -> Result<Self, RidgeError> {
        if alphas.is_empty() {
            return Err(RidgeError::EmptyAlphaGrid);
        }
        if let Some(&bad) = alphas.iter().find(|a| !a.is_finite() || **a <= 0.0) {
            return Err(RidgeError::InvalidAlpha(bad));
        }
        Ok(Self {
            alphas,
            formulation,
            params,
            fitted: None,
        })
    }

    /// The candidate regularization grid, in caller-supplied order.
    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Selects a regularization value per target over `cv_splits`, then
    /// refits on the full `x`/`y` with the selected values.
    pub fn fit(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        cv_splits: &[CvSplit],
    ) -> Result<(), RidgeError> {
        let (n_samples, n_features) = x.dim();
        if y.nrows() != n_samples {
            return Err(RidgeError::SampleCountMismatch {
                x_rows: n_samples,
                y_rows: y.nrows(),
            });
        }
        check_finite(x, "feature")?;
        check_finite(y, "target")?;
        if cv_splits.is_empty() {
            return Err(RidgeError::NoCvSplits);
        }
        for split in cv_splits {
            for &index in split.train.iter().chain(split.validation.iter()) {
                if index >= n_samples {
                    return Err(RidgeError::SplitIndexOutOfRange { index, n_samples });
                }
            }
        }

        let n_targets = y.ncols();
        let use_dual = match self.formulation {
            Formulation::Auto => n_features > n_samples,
            Formulation::Primal => false,
            Formulation::Dual => true,
        };
        log::info!(
            "Fitting {} ridge: {} candidates, {} cross-validation splits, {} samples x {} features, {} targets.",
            if use_dual { "dual (kernel)" } else { "primal" },
            self.alphas.len(),
            cv_splits.len(),
            n_samples,
            n_features,
            n_targets,
        );

        let cv_scores = self.cross_validate(x, y, cv_splits, use_dual)?;

        // Per-target accumulator of the running best mean score and its grid
        // index. The strict `>` keeps the first-seen maximum on ties.
        let mut best_score = vec![f64::NEG_INFINITY; n_targets];
        let mut best_index = vec![0usize; n_targets];
        for (alpha_index, row) in cv_scores.axis_iter(Axis(0)).enumerate() {
            for (&score, best, index) in izip!(row.iter(), &mut best_score, &mut best_index) {
                if score > *best {
                    *best = score;
                    *index = alpha_index;
                }
            }
        }
        let best_alphas = Array1::from_iter(best_index.iter().map(|&i| self.alphas[i]));

        let (lo, hi) = best_alphas.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &a| (lo.min(a), hi.max(a)),
        );
        log::info!("Selected alphas span [{lo:.3e}, {hi:.3e}] across {n_targets} targets.");

        let coef = if use_dual {
            let dual_coef = solve_dual(x, y, &best_alphas, self.params.n_targets_batch)?;
            FittedCoef::Dual {
                dual_coef,
                x_train: x.to_owned(),
            }
        } else {
            let coef = solve_primal(x, y, &best_alphas, self.params.n_targets_batch)?;
            FittedCoef::Primal { coef }
        };

        self.fitted = Some(FittedState {
            n_features,
            best_alphas,
            cv_scores,
            coef,
        });
        Ok(())
    }

    /// Mean validation score per (candidate, target), shape
    /// `[n_alphas, n_targets]`.
    fn cross_validate(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        cv_splits: &[CvSplit],
        use_dual: bool,
    ) -> Result<Array2<f64>, RidgeError> {
        // Splits are independent; scoring them in parallel changes nothing
        // observable since the per-split score matrices are summed.
        let per_split: Vec<Array2<f64>> = cv_splits
            .par_iter()
            .map(|split| self.score_split(x, y, split, use_dual))
            .collect::<Result<_, RidgeError>>()?;

        let mut total = Array2::zeros((self.alphas.len(), y.ncols()));
        for split_scores in &per_split {
            total += split_scores;
        }
        total /= cv_splits.len() as f64;
        Ok(total)
    }

    /// Validation R² for every (candidate, target) pair on one split.
    fn score_split(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        split: &CvSplit,
        use_dual: bool,
    ) -> Result<Array2<f64>, RidgeError> {
        let n_alphas = self.alphas.len();
        let n_targets = y.ncols();
        let y_val = y.select(Axis(0), &split.validation);
        let mut scores = Array2::zeros((n_alphas, n_targets));

        if split.train.is_empty() {
            // Degenerate single-run scheme: nothing to fit, predictions are
            // zero for every candidate.
            let zeros = Array2::zeros(y_val.dim());
            let row = scoring::r2_score(y_val.view(), zeros.view())?;
            for mut out in scores.axis_iter_mut(Axis(0)) {
                out.assign(&row);
            }
            return Ok(scores);
        }

        let x_tr = x.select(Axis(0), &split.train);
        let y_tr = y.select(Axis(0), &split.train);
        let x_val = x.select(Axis(0), &split.validation);
        log::debug!(
            "Scoring split: {} train / {} validation samples, {} candidates.",
            x_tr.nrows(),
            x_val.nrows(),
            n_alphas,
        );

        if use_dual {
            let kernel = x_tr.dot(&x_tr.t());
            let (evals, evecs) = kernel.eigh(UPLO::Lower)?;
            // Validation kernel projected onto the eigenbasis, shared by
            // every candidate.
            let k_val_v = x_val.dot(&x_tr.t()).dot(&evecs);
            for batch in batch_ranges(n_targets, self.params.n_targets_batch) {
                let vt_y = evecs.t().dot(&y_tr.slice(s![.., batch.clone()]));
                for (alpha_index, &alpha) in self.alphas.iter().enumerate() {
                    let scaled = scale_rows(&vt_y, &evals, alpha);
                    let predicted = k_val_v.dot(&scaled);
                    let r2 =
                        scoring::r2_score(y_val.slice(s![.., batch.clone()]), predicted.view())?;
                    scores.slice_mut(s![alpha_index, batch.clone()]).assign(&r2);
                }
            }
        } else {
            let gram = x_tr.t().dot(&x_tr);
            let (evals, evecs) = gram.eigh(UPLO::Lower)?;
            let x_val_v = x_val.dot(&evecs);
            for batch in batch_ranges(n_targets, self.params.n_targets_batch) {
                let xt_y = x_tr.t().dot(&y_tr.slice(s![.., batch.clone()]));
                let vt_xt_y = evecs.t().dot(&xt_y);
                for (alpha_index, &alpha) in self.alphas.iter().enumerate() {
                    let scaled = scale_rows(&vt_xt_y, &evals, alpha);
                    let predicted = x_val_v.dot(&scaled);
                    let r2 =
                        scoring::r2_score(y_val.slice(s![.., batch.clone()]), predicted.view())?;
                    scores.slice_mut(s![alpha_index, batch.clone()]).assign(&r2);
                }
            }
        }
        Ok(scores)
    }

    /// Applies the fitted per-target model. Output shape:
    /// `[x_new.nrows(), n_targets]`.
    pub fn predict(&self, x_new: ArrayView2<f64>) -> Result<Array2<f64>, RidgeError> {
        let state = self.fitted.as_ref().ok_or(RidgeError::NotFitted)?;
        if x_new.ncols() != state.n_features {
            return Err(RidgeError::FeatureCountMismatch {
                expected: state.n_features,
                found: x_new.ncols(),
            });
        }
        Ok(match &state.coef {
            FittedCoef::Primal { coef } => x_new.dot(coef),
            FittedCoef::Dual { dual_coef, x_train } => {
                x_new.dot(&x_train.t()).dot(dual_coef)
            }
        })
    }

    /// Generalization R² per target column on held-out data.
    pub fn score(
        &self,
        x_new: ArrayView2<f64>,
        y_new: ArrayView2<f64>,
    ) -> Result<Array1<f64>, RidgeError> {
        if y_new.nrows() != x_new.nrows() {
            return Err(RidgeError::SampleCountMismatch {
                x_rows: x_new.nrows(),
                y_rows: y_new.nrows(),
            });
        }
        let predicted = self.predict(x_new)?;
        Ok(scoring::r2_score(y_new, predicted.view())?)
    }

    /// Selected regularization value per target. Inspect this after fitting
    /// to detect saturation at the grid edges, a symptom of a mis-scaled
    /// grid.
    pub fn best_alphas(&self) -> Result<ArrayView1<f64>, RidgeError> {
        Ok(self
            .fitted
            .as_ref()
            .ok_or(RidgeError::NotFitted)?
            .best_alphas
            .view())
    }

    /// Mean validation score per (candidate, target) from the selection
    /// pass, shape `[n_alphas, n_targets]`.
    pub fn cv_scores(&self) -> Result<ArrayView2<f64>, RidgeError> {
        Ok(self
            .fitted
            .as_ref()
            .ok_or(RidgeError::NotFitted)?
            .cv_scores
            .view())
    }

    /// Feature-space coefficients, shape `[n_features, n_targets]`. A model
    /// fitted in dual form recovers them as `X_trainᵀ · dual_coef`.
    pub fn primal_coefficients(&self) -> Result<Array2<f64>, RidgeError> {
        let state = self.fitted.as_ref().ok_or(RidgeError::NotFitted)?;
        Ok(match &state.coef {
            FittedCoef::Primal { coef } => coef.clone(),
            FittedCoef::Dual { dual_coef, x_train } => x_train.t().dot(dual_coef),
        })
    }
}

/// Logarithmic regularization grid: `n` values spaced evenly in log10
/// between `10^min_exp` and `10^max_exp`, inclusive.
pub fn logspace(min_exp: f64, max_exp: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![10f64.powf(min_exp)],
        _ => {
            let step = (max_exp - min_exp) / (n - 1) as f64;
            (0..n)
                .map(|i| 10f64.powf(min_exp + step * i as f64))
                .collect()
        }
    }
}

/// Dual ridge solution on the full training data, one alpha per target:
/// `dual_coef[:, t] = (X Xᵀ + α_t I)⁻¹ y[:, t]`, via a single
/// eigendecomposition shared by all targets.
fn solve_dual(
    x: ArrayView2<f64>,
    y: ArrayView2<f64>,
    alphas: &Array1<f64>,
    n_targets_batch: usize,
) -> Result<Array2<f64>, RidgeError> {
    let kernel = x.dot(&x.t());
    let (evals, evecs) = kernel.eigh(UPLO::Lower)?;
    let mut dual_coef = Array2::zeros((x.nrows(), y.ncols()));
    for batch in batch_ranges(y.ncols(), n_targets_batch) {
        let mut vt_y = evecs.t().dot(&y.slice(s![.., batch.clone()]));
        scale_rows_per_target(&mut vt_y, &evals, &alphas.slice(s![batch.clone()]));
        dual_coef
            .slice_mut(s![.., batch])
            .assign(&evecs.dot(&vt_y));
    }
    Ok(dual_coef)
}

/// Primal ridge solution on the full training data, one alpha per target:
/// `coef[:, t] = (Xᵀ X + α_t I)⁻¹ Xᵀ y[:, t]`.
fn solve_primal(
    x: ArrayView2<f64>,
    y: ArrayView2<f64>,
    alphas: &Array1<f64>,
    n_targets_batch: usize,
) -> Result<Array2<f64>, RidgeError> {
    let gram = x.t().dot(&x);
    let (evals, evecs) = gram.eigh(UPLO::Lower)?;
    let mut coef = Array2::zeros((x.ncols(), y.ncols()));
    for batch in batch_ranges(y.ncols(), n_targets_batch) {
        let xt_y = x.t().dot(&y.slice(s![.., batch.clone()]));
        let mut vt_xt_y = evecs.t().dot(&xt_y);
        scale_rows_per_target(&mut vt_xt_y, &evals, &alphas.slice(s![batch.clone()]));
        coef.slice_mut(s![.., batch])
            .assign(&evecs.dot(&vt_xt_y));
    }
    Ok(coef)
}

/// Divides every row `i` of `m` by `evals[i] + alpha`, returning a new
/// matrix. Gram eigenvalues are non-negative up to roundoff; the clamp
/// removes the roundoff.
fn scale_rows(m: &Array2<f64>, evals: &Array1<f64>, alpha: f64) -> Array2<f64> {
    let mut out = m.clone();
    for (mut row, &eigenvalue) in out.axis_iter_mut(Axis(0)).zip(evals.iter()) {
        let denominator = eigenvalue.max(0.0) + alpha;
        row.mapv_inplace(|v| v / denominator);
    }
    out
}

/// In-place variant with a separate alpha per column.
fn scale_rows_per_target(m: &mut Array2<f64>, evals: &Array1<f64>, alphas: &ArrayView1<f64>) {
    for (mut row, &eigenvalue) in m.axis_iter_mut(Axis(0)).zip(evals.iter()) {
        for (value, &alpha) in row.iter_mut().zip(alphas.iter()) {
            *value /= eigenvalue.max(0.0) + alpha;
        }
    }
}

fn batch_ranges(n: usize, batch_size: usize) -> Vec<Range<usize>> {
    let step = batch_size.max(1);
    (0..n)
        .step_by(step)
        .map(|start| start..(start + step).min(n))
        .collect()
}

fn check_finite(m: ArrayView2<f64>, label: &'static str) -> Result<(), RidgeError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(RidgeError::NonFiniteInput(label));
    }
    Ok(())
}
