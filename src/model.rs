//! The trained encoding-model artifact.
//!
//! A fitted pipeline exports everything prediction needs — delays, the
//! regularization grid, the learned feature means, the per-target selected
//! alphas, and the primal coefficients — into a serializable structure that
//! round-trips through a TOML file.

use crate::preprocess::{Delayer, PreprocessError, Scaler};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// Custom error type for model loading, saving, and prediction.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML model file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Prediction features have {found} columns, but the model was trained on {expected}.")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
}

/// Hyperparameters captured at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Feature delays, in samples, in application order.
    pub delays: Vec<usize>,
    /// Candidate regularization grid the per-target values were selected
    /// from.
    pub alphas: Vec<f64>,
}

/// The top-level, self-contained trained artifact. This is the structure
/// that gets saved to and loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingModel {
    pub config: EncodingConfig,
    /// Per-column training means, subtracted before delay embedding.
    pub feature_means: Array1<f64>,
    /// Selected regularization value per target.
    pub best_alphas: Array1<f64>,
    /// Feature-space coefficients, shape `[n_features * n_delays, n_targets]`.
    pub primal_coef: Array2<f64>,
}

impl EncodingModel {
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        let serialized = toml::to_string(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn n_targets(&self) -> usize {
        self.primal_coef.ncols()
    }

    pub fn n_features(&self) -> usize {
        self.feature_means.len()
    }

    /// Applies the trained model to new features: the stored centering, the
    /// stored delays, then the primal coefficients.
    pub fn predict(&self, x_new: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        if x_new.ncols() != self.feature_means.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.feature_means.len(),
                found: x_new.ncols(),
            });
        }
        let scaler = Scaler::with_mean(self.feature_means.clone());
        let delayer = Delayer::new(self.config.delays.clone())?;
        let centered = scaler.transform(x_new)?;
        let delayed = delayer.transform(centered.view());
        Ok(delayed.dot(&self.primal_coef))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tempfile::tempdir;

    fn toy_model() -> EncodingModel {
        EncodingModel {
            config: EncodingConfig {
                delays: vec![0, 1],
                alphas: vec![0.1, 10.0],
            },
            feature_means: array![1.0, -2.0],
            best_alphas: array![0.1],
            // Weight 1.0 on feature 0 at delay 0, weight 0.5 on feature 1
            // at delay 1.
            primal_coef: array![[1.0], [0.0], [0.0], [0.5]],
        }
    }

    #[test]
    fn predicts_through_centering_and_delays() {
        let model = toy_model();
        let x = array![[2.0, 0.0], [3.0, -1.0]];
        let predictions = model.predict(x.view()).unwrap();
        // Centered x: [[1, 2], [2, 1]].
        // Row 0: 1*1 + 0.5*0 (delayed row is zero-filled) = 1.0
        // Row 1: 1*2 + 0.5*2 = 3.0
        assert_abs_diff_eq!(predictions[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(predictions[[1, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_feature_count_mismatch() {
        let model = toy_model();
        let x = array![[1.0], [2.0]];
        assert!(matches!(
            model.predict(x.view()).unwrap_err(),
            ModelError::FeatureCountMismatch {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn save_load_round_trip_preserves_predictions() {
        let model = toy_model();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        let path = path.to_str().unwrap();

        model.save(path).unwrap();
        let loaded = EncodingModel::load(path).unwrap();

        assert_eq!(loaded.config.delays, model.config.delays);
        assert_eq!(loaded.n_targets(), 1);
        assert_eq!(loaded.n_features(), 2);

        let x = array![[0.5, 0.5], [-1.0, 4.0], [2.5, -3.5]];
        let before = model.predict(x.view()).unwrap();
        let after = loaded.predict(x.view()).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }
}
