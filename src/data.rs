//! # Data Loading Module
//!
//! Reads tabular (TSV) feature matrices, response matrices, and run-onset
//! vectors into the `ndarray` structures the pipeline consumes. The loader
//! is deliberately a narrow seam: the rest of the crate only sees "a named
//! 2D numeric array or a 1D index array", so the on-disk format can be
//! swapped without touching the modeling core.
//!
//! Responses recorded outside the cortex frequently contain NaNs. The
//! estimator refuses non-finite input, so [`zero_fill_non_finite`] is the
//! explicit substitution step callers run on responses before fitting.

use ndarray::{Array2, ShapeBuilder};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input file '{0}' contains no data rows.")]
    EmptyFile(String),

    #[error(
        "Column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },

    #[error("Missing or null values were found in the required column '{0}'.")]
    MissingValuesFound(String),

    #[error("Run-onset file must contain exactly one column, but has {0}.")]
    OnsetColumnCount(usize),

    #[error("Run onset {0} is negative; onsets are sample indices.")]
    NegativeOnset(i64),
}

/// Loads a whole TSV file as a 2D sample matrix: rows are time samples,
/// columns are features or targets, in file column order. Null cells become
/// NaN; run [`zero_fill_non_finite`] afterwards if the matrix feeds the
/// estimator.
pub fn load_matrix(path: &str) -> Result<Array2<f64>, DataError> {
    log::info!("Loading sample matrix from '{path}'");
    let df = read_tsv(path)?;
    if df.height() == 0 {
        return Err(DataError::EmptyFile(path.to_string()));
    }

    let n_rows = df.height();
    let column_names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let n_cols = column_names.len();

    let mut buffer = Vec::with_capacity(n_rows * n_cols);
    for name in &column_names {
        buffer.extend(extract_f64_column(&df, name)?);
    }

    // The buffer is filled column by column, hence the column-major shape.
    let matrix = Array2::from_shape_vec((n_rows, n_cols).f(), buffer)
        .expect("column buffers have consistent lengths");
    log::info!("Loaded {n_rows} samples x {n_cols} columns from '{path}'");
    Ok(matrix)
}

/// Loads a single-column TSV of run onsets (the first sample index of each
/// recording run).
pub fn load_run_onsets(path: &str) -> Result<Vec<usize>, DataError> {
    log::info!("Loading run onsets from '{path}'");
    let df = read_tsv(path)?;
    if df.width() != 1 {
        return Err(DataError::OnsetColumnCount(df.width()));
    }
    if df.height() == 0 {
        return Err(DataError::EmptyFile(path.to_string()));
    }

    let name = df.get_column_names()[0].to_string();
    let column = df.column(&name)?;
    let casted = column
        .cast(&DataType::Int64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: name.clone(),
            expected_type: "i64 (integer sample index)",
            found_type: format!("{:?}", column.dtype()),
        })?;
    let chunked = casted.i64()?.rechunk();

    let mut onsets = Vec::with_capacity(df.height());
    for value in chunked.into_iter() {
        let onset = value.ok_or_else(|| DataError::MissingValuesFound(name.clone()))?;
        if onset < 0 {
            return Err(DataError::NegativeOnset(onset));
        }
        onsets.push(onset as usize);
    }
    Ok(onsets)
}

/// Replaces every NaN or infinite entry with zero, in place, and returns
/// how many entries were replaced. This is the explicit substitution the
/// estimator requires before it sees the data.
pub fn zero_fill_non_finite(matrix: &mut Array2<f64>) -> usize {
    let mut replaced = 0usize;
    matrix.mapv_inplace(|value| {
        if value.is_finite() {
            value
        } else {
            replaced += 1;
            0.0
        }
    });
    replaced
}

fn read_tsv(path: &str) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    Ok(df)
}

/// Extracts one column as `f64`, mapping nulls to NaN.
fn extract_f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
    let column = df.column(name)?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        })?;
    let chunked = casted.f64()?.rechunk();
    Ok(chunked
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn loads_a_matrix_in_row_column_order() {
        let file = create_test_tsv("f1\tf2\n1.0\t10.0\n2.0\t20.0\n3.0\t30.0").unwrap();
        let matrix = load_matrix(file.path().to_str().unwrap()).unwrap();
        assert_eq!(matrix.shape(), &[3, 2]);
        assert_abs_diff_eq!(matrix[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix[[0, 1]], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix[[2, 1]], 30.0, epsilon = 1e-12);
    }

    #[test]
    fn null_cells_become_nan() {
        let file = create_test_tsv("f1\tf2\n1.0\t\n2.0\t20.0").unwrap();
        let matrix = load_matrix(file.path().to_str().unwrap()).unwrap();
        assert!(matrix[[0, 1]].is_nan());
        assert_abs_diff_eq!(matrix[[1, 1]], 20.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_non_numeric_columns() {
        let file = create_test_tsv("f1\tf2\n1.0\tnot_a_number\n2.0\talso_text").unwrap();
        match load_matrix(file.path().to_str().unwrap()).unwrap_err() {
            DataError::ColumnWrongType { column_name, .. } => assert_eq!(column_name, "f2"),
            other => panic!("expected ColumnWrongType, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_files() {
        let file = create_test_tsv("f1\tf2").unwrap();
        assert!(matches!(
            load_matrix(file.path().to_str().unwrap()).unwrap_err(),
            DataError::EmptyFile(_)
        ));
    }

    #[test]
    fn loads_run_onsets() {
        let file = create_test_tsv("onset\n0\n600\n1200").unwrap();
        let onsets = load_run_onsets(file.path().to_str().unwrap()).unwrap();
        assert_eq!(onsets, vec![0, 600, 1200]);
    }

    #[test]
    fn rejects_negative_onsets_and_extra_columns() {
        let file = create_test_tsv("onset\n0\n-5").unwrap();
        assert!(matches!(
            load_run_onsets(file.path().to_str().unwrap()).unwrap_err(),
            DataError::NegativeOnset(-5)
        ));

        let file = create_test_tsv("a\tb\n0\t1").unwrap();
        assert!(matches!(
            load_run_onsets(file.path().to_str().unwrap()).unwrap_err(),
            DataError::OnsetColumnCount(2)
        ));
    }

    #[test]
    fn zero_fill_replaces_and_counts_non_finite_entries() {
        let mut matrix = ndarray::array![[1.0, f64::NAN], [f64::INFINITY, 4.0]];
        let replaced = zero_fill_non_finite(&mut matrix);
        assert_eq!(replaced, 2);
        assert_eq!(matrix, ndarray::array![[1.0, 0.0], [0.0, 4.0]]);
    }
}
