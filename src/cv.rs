//! Leave-one-run-out cross-validation.
//!
//! fMRI time series are autocorrelated, so random shuffling would leak
//! information between training and validation sets. The splits built here
//! hold out one contiguous recording run at a time, preserving the temporal
//! block structure of the data.

use thiserror::Error;

/// A single cross-validation split. Both fields are row indices into the
/// training sample matrix; they are disjoint, and `validation` covers
/// exactly one run's contiguous index range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// A comprehensive error type for cross-validation scheme construction.
#[derive(Error, Debug)]
pub enum CvError {
    #[error("At least one run onset is required.")]
    EmptyRunOnsets,

    #[error("Cannot build cross-validation splits for zero samples.")]
    NoSamples,

    #[error("The first run onset must be 0, but was {0}.")]
    FirstOnsetNotZero(usize),

    #[error(
        "Run onsets must be strictly increasing, but onset {next} at position {position} does not exceed the previous onset {previous}."
    )]
    NotStrictlyIncreasing {
        previous: usize,
        next: usize,
        position: usize,
    },

    #[error("Run onset {onset} is out of range for {n_samples} samples.")]
    OnsetOutOfRange { onset: usize, n_samples: usize },

    #[error("Run length must be positive.")]
    ZeroRunLength,
}

/// Builds a leave-one-run-out cross-validation scheme.
///
/// `run_onsets` holds the index of the first sample of each run; run `k`
/// spans `run_onsets[k]..run_onsets[k + 1]` (the last run extends to
/// `n_samples`). The returned sequence contains one split per run, in run
/// order: the run's range is the validation set and the complement is the
/// training set.
///
/// A single run yields one split whose training set is empty. That split is
/// degenerate but valid; callers decide how to score it.
pub fn generate_leave_one_run_out(
    n_samples: usize,
    run_onsets: &[usize],
) -> Result<Vec<CvSplit>, CvError> {
    if n_samples == 0 {
        return Err(CvError::NoSamples);
    }
    if run_onsets.is_empty() {
        return Err(CvError::EmptyRunOnsets);
    }
    if run_onsets[0] != 0 {
        return Err(CvError::FirstOnsetNotZero(run_onsets[0]));
    }
    for (position, pair) in run_onsets.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(CvError::NotStrictlyIncreasing {
                previous: pair[0],
                next: pair[1],
                position: position + 1,
            });
        }
    }
    // Onsets are strictly increasing, so checking the last one covers all.
    let last = *run_onsets.last().expect("onsets checked non-empty");
    if last >= n_samples {
        return Err(CvError::OnsetOutOfRange {
            onset: last,
            n_samples,
        });
    }

    let mut splits = Vec::with_capacity(run_onsets.len());
    for (k, &onset) in run_onsets.iter().enumerate() {
        let end = run_onsets.get(k + 1).copied().unwrap_or(n_samples);
        let validation: Vec<usize> = (onset..end).collect();
        let train: Vec<usize> = (0..onset).chain(end..n_samples).collect();
        splits.push(CvSplit { train, validation });
    }
    Ok(splits)
}

/// Run onsets for recordings made of equal-length runs:
/// `0, run_length, 2 * run_length, ...` up to `n_samples`.
pub fn evenly_spaced_run_onsets(
    n_samples: usize,
    run_length: usize,
) -> Result<Vec<usize>, CvError> {
    if n_samples == 0 {
        return Err(CvError::NoSamples);
    }
    if run_length == 0 {
        return Err(CvError::ZeroRunLength);
    }
    Ok((0..n_samples).step_by(run_length).collect())
}
