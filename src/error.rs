use std::path::PathBuf;

use thiserror::Error;

use crate::data::mzml::MzMLError;

/// Errors raised by the processing pipeline and its storage layer.
///
/// The first three variants are the user-facing taxonomy surfaced by the
/// dashboard; the rest wrap infrastructure failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{extension} used. Please only use h5, csv, mzML, or mzML.gz files")]
    UnsupportedFormat { extension: String },

    #[error("{} already exists. Please rename before continuing", path.display())]
    OutputExists { path: PathBuf },

    #[error("Select files and adjust parameters before clicking 'Rerun'")]
    MissingSelection,

    #[error("no converted container path configured for raw file {}", path.display())]
    MissingConversionTarget { path: PathBuf },

    #[error("accession '{name}' not found in {}", path.display())]
    UnknownAccession { name: String, path: PathBuf },

    #[error("invalid radius '{input}': {reason}")]
    InvalidRadius { input: String, reason: String },

    #[error("column '{0}' not found in dataset")]
    MissingColumn(String),

    #[error("section '{key}' not found in {}", path.display())]
    MissingSection { key: String, path: PathBuf },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("mzML error: {0}")]
    MzML(#[from] MzMLError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
