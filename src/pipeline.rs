//! The end-to-end encoding pipeline: centering, delay embedding, and
//! cross-validated ridge regression as a single fit/predict/score unit.
//!
//! The pipeline guarantees that preprocessing parameters are derived from
//! training data only and reapplied identically, in the same order, at
//! prediction time. Its state moves one way, UNFITTED → FITTED; there is no
//! reset.

use crate::cv::CvSplit;
use crate::model::{EncodingConfig, EncodingModel};
use crate::preprocess::{Delayer, PreprocessError, Scaler};
use crate::ridge::{Formulation, RidgeCv, RidgeError, SolverParams};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("The pipeline must be fitted before calling this operation.")]
    NotFitted,

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Ridge(#[from] RidgeError),
}

/// Centering → delay embedding → per-target cross-validated ridge.
///
/// The cross-validation splits and the regularization grid are captured at
/// construction; `fit` consumes them unchanged.
#[derive(Debug)]
pub struct EncodingPipeline {
    scaler: Scaler,
    delayer: Delayer,
    estimator: RidgeCv,
    cv_splits: Vec<CvSplit>,
    fitted: bool,
}

impl EncodingPipeline {
    pub fn new(
        delays: Vec<usize>,
        alphas: Vec<f64>,
        cv_splits: Vec<CvSplit>,
        formulation: Formulation,
        params: SolverParams,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            scaler: Scaler::new(),
            delayer: Delayer::new(delays)?,
            estimator: RidgeCv::new(alphas, formulation, params)?,
            cv_splits,
            fitted: false,
        })
    }

    /// Fits the whole pipeline on training data: learns the per-column
    /// means, expands the centered features with the configured delays, and
    /// fits the estimator using the captured CV splits. Transitions
    /// UNFITTED → FITTED on success.
    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<(), PipelineError> {
        log::info!(
            "Fitting encoding pipeline: {} samples x {} features, {} delays, {} targets.",
            x.nrows(),
            x.ncols(),
            self.delayer.delays().len(),
            y.ncols(),
        );
        let centered = self.scaler.fit_transform(x)?;
        let delayed = self.delayer.transform(centered.view());
        self.estimator.fit(delayed.view(), y, &self.cv_splits)?;
        self.fitted = true;
        Ok(())
    }

    /// Centering then delay embedding, with the parameters learned at fit
    /// time. The fixed stage order is what keeps train and test
    /// representations comparable.
    fn preprocess(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, PipelineError> {
        if !self.fitted {
            return Err(PipelineError::NotFitted);
        }
        let centered = self.scaler.transform(x)?;
        Ok(self.delayer.transform(centered.view()))
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, PipelineError> {
        let delayed = self.preprocess(x)?;
        Ok(self.estimator.predict(delayed.view())?)
    }

    /// Generalization R² per target on held-out data.
    pub fn score(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) -> Result<Array1<f64>, PipelineError> {
        let delayed = self.preprocess(x)?;
        Ok(self.estimator.score(delayed.view(), y)?)
    }

    /// Selected regularization value per target.
    pub fn best_alphas(&self) -> Result<ArrayView1<f64>, PipelineError> {
        if !self.fitted {
            return Err(PipelineError::NotFitted);
        }
        Ok(self.estimator.best_alphas()?)
    }

    /// Feature-space coefficients of the fitted estimator, shape
    /// `[n_features * n_delays, n_targets]`.
    pub fn primal_coefficients(&self) -> Result<Array2<f64>, PipelineError> {
        if !self.fitted {
            return Err(PipelineError::NotFitted);
        }
        Ok(self.estimator.primal_coefficients()?)
    }

    pub fn delayer(&self) -> &Delayer {
        &self.delayer
    }

    /// Exports the fitted pipeline as a self-contained artifact that can be
    /// saved to disk and used for prediction without the training data.
    pub fn to_model(&self) -> Result<EncodingModel, PipelineError> {
        if !self.fitted {
            return Err(PipelineError::NotFitted);
        }
        let feature_means = self
            .scaler
            .mean()
            .ok_or(PipelineError::NotFitted)?
            .clone();
        Ok(EncodingModel {
            config: EncodingConfig {
                delays: self.delayer.delays().to_vec(),
                alphas: self.estimator.alphas().to_vec(),
            },
            feature_means,
            best_alphas: self.estimator.best_alphas()?.to_owned(),
            primal_coef: self.estimator.primal_coefficients()?,
        })
    }
}
