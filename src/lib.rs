#![deny(dead_code)]
#![deny(unused_imports)]

//! Voxelwise encoding models: predict multi-target brain responses from
//! stimulus features with delay embedding and cross-validated ridge
//! regression. The regularization strength is selected per target over a
//! leave-one-run-out cross-validation scheme that respects the temporal
//! block structure of the recordings.

pub mod cv;
pub mod data;
pub mod diagnostics;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod ridge;
pub mod scoring;
